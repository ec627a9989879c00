use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

/// Expected capacity and false-positive rate.
/// Tune these based on real enrollment counts.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static ROLL_FILTER: Lazy<RwLock<CuckooFilter<String>>> = Lazy::new(|| {
    RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE))
});

#[inline]
fn normalize(roll_no: &str) -> String {
    roll_no.trim().to_uppercase()
}

/// Check if a roll number might exist (false positives possible)
pub fn might_exist(roll_no: &str) -> bool {
    let roll_no = normalize(roll_no);
    ROLL_FILTER
        .read()
        .expect("roll filter poisoned")
        .contains(&roll_no)
}

/// Insert a single roll number into the filter
pub fn insert(roll_no: &str) {
    let roll_no = normalize(roll_no);
    ROLL_FILTER
        .write()
        .expect("roll filter poisoned")
        .add(&roll_no);
}

/// Remove a roll number from the filter (student deleted)
pub fn remove(roll_no: &str) {
    let roll_no = normalize(roll_no);
    ROLL_FILTER
        .write()
        .expect("roll filter poisoned")
        .remove(&roll_no);
}

/// Warm up the roll filter from the student directory using streaming + batching
pub async fn warmup_roll_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT student_id FROM students").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (roll_no,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(normalize(&roll_no));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Roll filter warmup complete: {} students", total);
    Ok(())
}

/// Insert a batch of normalized roll numbers
fn insert_batch(roll_nos: &[String]) {
    let mut filter = ROLL_FILTER.write().expect("roll filter poisoned");

    for roll_no in roll_nos {
        filter.add(roll_no);
    }
}

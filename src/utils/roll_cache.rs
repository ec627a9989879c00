use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

/// true  => roll number is TAKEN
/// false => roll number is AVAILABLE (usually we store only taken)
pub static ROLL_CACHE: Lazy<Cache<String, bool>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000) // tune based on memory
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

/// Mark a single roll number as taken
pub async fn mark_taken(roll_no: &str) {
    ROLL_CACHE.insert(roll_no.trim().to_uppercase(), true).await;
}

/// Check if a roll number is taken
pub async fn is_taken(roll_no: &str) -> bool {
    ROLL_CACHE
        .get(&roll_no.trim().to_uppercase())
        .await
        .unwrap_or(false)
}

/// Drop a roll number from the cache (student deleted)
pub async fn invalidate(roll_no: &str) {
    ROLL_CACHE.invalidate(&roll_no.trim().to_uppercase()).await;
}

/// Batch mark roll numbers as taken
async fn batch_mark(roll_nos: &[String]) {
    let futures: Vec<_> = roll_nos
        .iter()
        .map(|r| ROLL_CACHE.insert(r.trim().to_uppercase(), true))
        .collect();

    // Await all insertions concurrently
    futures::future::join_all(futures).await;
}

/// Load only RECENTLY registered roll numbers into the in-memory cache (batched)
pub async fn warmup_roll_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT student_id
        FROM students
        WHERE created_at >= NOW() - INTERVAL ? DAY
        ORDER BY created_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let (roll_no,) = row?;
        batch.push(roll_no);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_mark(&batch).await;
            batch.clear();
        }
    }

    // Insert any remaining roll numbers
    if !batch.is_empty() {
        batch_mark(&batch).await;
    }

    log::info!(
        "Roll cache warmup complete: {} students (last {} days)",
        total_count,
        days
    );

    Ok(())
}

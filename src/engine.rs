//! Attendance reconciliation engine.
//!
//! Maintains exactly one attendance day per (teacher, calendar day, class,
//! section) and merges incoming marks into it. Manual batch marks are
//! best-effort (unknown students get placeholder identity), face-match marks
//! are strict (unknown roll numbers are rejected so the face index stays
//! consistent with the directory).

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlPool, types::Json};
use tracing::error;
use utoipa::ToSchema;

use crate::model::{
    attendance::{AttendanceDay, AttendanceRecord, AttendanceStatus},
    student::Student,
};

const DAY_COLUMNS: &str =
    "id, teacher_id, date, class, section, subject, records, created_at, updated_at";

#[derive(Debug, Display)]
pub enum EngineError {
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    ValidationFailed(String),
    #[display(fmt = "{}", _0)]
    UpstreamUnavailable(String),
    #[display(fmt = "Database error")]
    Db(sqlx::Error),
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        error!(error = %e, "database failure");
        EngineError::Db(e)
    }
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            EngineError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": self.to_string(),
        }))
    }
}

/// One manual (student, status) assignment.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Mark {
    pub student_ref: u64,
    pub status: AttendanceStatus,
}

/// A (roll number, confidence) pair reported by the face matcher.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatch {
    pub student_id: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecognizedMark {
    pub name: String,
    pub student_id: String,
    pub confidence: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub name: String,
    pub student_id: String,
}

pub enum SingleFaceOutcome {
    Marked(RecognizedMark),
    AlreadyMarked(RecognizedMark),
}

#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiFaceOutcome {
    pub marked: Vec<RecognizedMark>,
    pub already_marked: Vec<StudentSummary>,
    pub not_found: Vec<String>,
}

/// Half-open local-day window `[00:00, next day 00:00)` used by every lookup.
pub fn day_window(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_hms_opt(0, 0, 0).unwrap();
    (start, start + Duration::days(1))
}

fn mark_stamp(date: NaiveDate) -> NaiveDateTime {
    date.and_time(Local::now().time())
}

// ---------------------------------------------------------------------------
// Pure merge core
// ---------------------------------------------------------------------------

/// Manual-mark merge: overwrite status and refresh `marked_at` for a student
/// already in the day, append a snapshot otherwise. Applied in input order,
/// so a later mark for the same student in one call wins.
fn apply_marks(records: &mut Vec<AttendanceRecord>, incoming: Vec<AttendanceRecord>) {
    for mark in incoming {
        match records
            .iter_mut()
            .find(|r| r.student_ref == mark.student_ref)
        {
            Some(existing) => {
                existing.status = mark.status;
                existing.marked_at = mark.marked_at;
            }
            None => records.push(mark),
        }
    }
}

/// Face-mark merge: append only students not yet in the day. Existing records
/// are left untouched so camera re-scans never refresh `marked_at`.
fn append_missing(records: &mut Vec<AttendanceRecord>, incoming: Vec<AttendanceRecord>) {
    for rec in incoming {
        if !records
            .iter()
            .any(|r| r.student_roll_no == rec.student_roll_no)
        {
            records.push(rec);
        }
    }
}

struct ResolvedMatch {
    student: Option<Student>,
    roll_no: String,
    confidence: f64,
}

/// Partition directory-resolved matches into marked / already-marked /
/// not-found buckets against the day's current records. Returns the outcome
/// plus the new records to append in one batched write.
fn partition_matches(
    existing: &[AttendanceRecord],
    resolved: Vec<ResolvedMatch>,
    stamp: NaiveDateTime,
) -> (MultiFaceOutcome, Vec<AttendanceRecord>) {
    let mut outcome = MultiFaceOutcome::default();
    let mut new_records: Vec<AttendanceRecord> = Vec::new();

    for m in resolved {
        let Some(student) = m.student else {
            outcome.not_found.push(m.roll_no);
            continue;
        };

        if existing
            .iter()
            .any(|r| r.student_roll_no == student.student_id)
        {
            outcome.already_marked.push(StudentSummary {
                name: student.name,
                student_id: student.student_id,
            });
            continue;
        }

        if new_records
            .iter()
            .any(|r| r.student_roll_no == student.student_id)
        {
            // Same face matched more than once in one frame, first wins.
            continue;
        }

        outcome.marked.push(RecognizedMark {
            name: student.name.clone(),
            student_id: student.student_id.clone(),
            confidence: m.confidence,
        });
        new_records.push(AttendanceRecord {
            student_ref: student.id,
            student_name: student.name,
            student_roll_no: student.student_id,
            status: AttendanceStatus::Present,
            marked_at: stamp,
        });
    }

    (outcome, new_records)
}

fn resolve_mark(mark: &Mark, student: Option<&Student>, now: NaiveDateTime) -> AttendanceRecord {
    // Unknown refs get placeholder identity instead of failing the batch.
    AttendanceRecord {
        student_ref: mark.student_ref,
        student_name: student
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        student_roll_no: student
            .map(|s| s.student_id.clone())
            .unwrap_or_else(|| "N/A".to_string()),
        status: mark.status,
        marked_at: now,
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

async fn find_day(
    pool: &MySqlPool,
    teacher_id: u64,
    window: (NaiveDateTime, NaiveDateTime),
    class: &str,
    section: &str,
) -> Result<Option<AttendanceDay>, EngineError> {
    let day = sqlx::query_as::<_, AttendanceDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM attendance_days
         WHERE teacher_id = ? AND date >= ? AND date < ? AND class = ? AND section = ?"
    ))
    .bind(teacher_id)
    .bind(window.0)
    .bind(window.1)
    .bind(class)
    .bind(section)
    .fetch_optional(pool)
    .await?;
    Ok(day)
}

/// Atomic find-or-create keyed by the (teacher, day, class, section) unique
/// index. Two concurrent first marks converge on the same row instead of
/// racing a read-then-insert. Subject is written only when the row is
/// created; later merges never overwrite it.
async fn find_or_create_day(
    pool: &MySqlPool,
    teacher_id: u64,
    stamp: NaiveDateTime,
    class: &str,
    section: &str,
    subject: &str,
) -> Result<AttendanceDay, EngineError> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_days (teacher_id, date, day, class, section, subject, records)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE id = LAST_INSERT_ID(id)
        "#,
    )
    .bind(teacher_id)
    .bind(stamp)
    .bind(stamp.date())
    .bind(class)
    .bind(section)
    .bind(subject)
    .bind(Json(Vec::<AttendanceRecord>::new()))
    .execute(pool)
    .await?;

    let day = sqlx::query_as::<_, AttendanceDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM attendance_days WHERE id = ?"
    ))
    .bind(result.last_insert_id())
    .fetch_one(pool)
    .await?;
    Ok(day)
}

/// Single row-level write, atomic at the document level.
async fn persist_records(pool: &MySqlPool, day: &AttendanceDay) -> Result<(), EngineError> {
    sqlx::query("UPDATE attendance_days SET records = ? WHERE id = ?")
        .bind(Json(&day.records.0))
        .bind(day.id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn student_by_ref(pool: &MySqlPool, id: u64) -> Result<Option<Student>, EngineError> {
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(student)
}

pub async fn student_by_roll(
    pool: &MySqlPool,
    roll_no: &str,
) -> Result<Option<Student>, EngineError> {
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE student_id = ?")
        .bind(roll_no)
        .fetch_optional(pool)
        .await?;
    Ok(student)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Merge a manual batch of marks into the day, creating it on first mark.
/// Returns the full updated day.
pub async fn mark_batch(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
    class: &str,
    section: &str,
    subject_hint: &str,
    marks: &[Mark],
) -> Result<AttendanceDay, EngineError> {
    let stamp = mark_stamp(date);
    let mut day = find_or_create_day(pool, teacher_id, stamp, class, section, subject_hint).await?;

    let mut resolved = Vec::with_capacity(marks.len());
    for mark in marks {
        let student = student_by_ref(pool, mark.student_ref).await?;
        resolved.push(resolve_mark(mark, student.as_ref(), stamp));
    }

    apply_marks(&mut day.records.0, resolved);
    persist_records(pool, &day).await?;
    Ok(day)
}

/// Mark one face-recognized student present. An already-marked student is a
/// no-op returning the existing-mark signal; an unknown roll number is a
/// directory/face-index inconsistency and is rejected.
pub async fn mark_single_from_face(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
    class: &str,
    section: &str,
    subject_hint: &str,
    roll_no: &str,
    confidence: f64,
) -> Result<SingleFaceOutcome, EngineError> {
    let student = student_by_roll(pool, roll_no)
        .await?
        .ok_or_else(|| EngineError::NotFound("Student not found in database".to_string()))?;

    let existing = find_day(pool, teacher_id, day_window(date), class, section).await?;

    let recognized = RecognizedMark {
        name: student.name.clone(),
        student_id: student.student_id.clone(),
        confidence,
    };

    if let Some(day) = &existing {
        if day
            .records
            .0
            .iter()
            .any(|r| r.student_roll_no == student.student_id)
        {
            return Ok(SingleFaceOutcome::AlreadyMarked(recognized));
        }
    }

    let stamp = mark_stamp(date);
    let mut day = match existing {
        Some(day) => day,
        None => find_or_create_day(pool, teacher_id, stamp, class, section, subject_hint).await?,
    };

    append_missing(
        &mut day.records.0,
        vec![AttendanceRecord {
            student_ref: student.id,
            student_name: student.name,
            student_roll_no: student.student_id,
            status: AttendanceStatus::Present,
            marked_at: stamp,
        }],
    );
    persist_records(pool, &day).await?;

    Ok(SingleFaceOutcome::Marked(recognized))
}

/// Mark a set of face-recognized students, bucketing the matches and
/// persisting only the newly marked ones in one batched write.
pub async fn mark_multiple_from_faces(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
    class: &str,
    section: &str,
    subject_hint: &str,
    matches: &[FaceMatch],
) -> Result<MultiFaceOutcome, EngineError> {
    let existing = find_day(pool, teacher_id, day_window(date), class, section).await?;
    let stamp = mark_stamp(date);

    let mut resolved = Vec::with_capacity(matches.len());
    for m in matches {
        resolved.push(ResolvedMatch {
            student: student_by_roll(pool, &m.student_id).await?,
            roll_no: m.student_id.clone(),
            confidence: m.confidence,
        });
    }

    let current: &[AttendanceRecord] = existing
        .as_ref()
        .map(|d| d.records.0.as_slice())
        .unwrap_or(&[]);
    let (outcome, new_records) = partition_matches(current, resolved, stamp);

    if !new_records.is_empty() {
        let mut day = match existing {
            Some(day) => day,
            None => {
                find_or_create_day(pool, teacher_id, stamp, class, section, subject_hint).await?
            }
        };
        append_missing(&mut day.records.0, new_records);
        persist_records(pool, &day).await?;
    }

    Ok(outcome)
}

/// Delete every attendance day for the teacher on the calendar date,
/// regardless of class/section. Deleting nothing is success.
pub async fn reset_day(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
) -> Result<u64, EngineError> {
    let (start, end) = day_window(date);
    let result =
        sqlx::query("DELETE FROM attendance_days WHERE teacher_id = ? AND date >= ? AND date < ?")
            .bind(teacher_id)
            .bind(start)
            .bind(end)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// All sessions for the teacher on the calendar date.
pub async fn days_for_date(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
) -> Result<Vec<AttendanceDay>, EngineError> {
    let (start, end) = day_window(date);
    let days = sqlx::query_as::<_, AttendanceDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM attendance_days
         WHERE teacher_id = ? AND date >= ? AND date < ?"
    ))
    .bind(teacher_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;
    Ok(days)
}

/// First session of the day, used by the full-day CSV export.
pub async fn first_day_for_date(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
) -> Result<Option<AttendanceDay>, EngineError> {
    let (start, end) = day_window(date);
    let day = sqlx::query_as::<_, AttendanceDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM attendance_days
         WHERE teacher_id = ? AND date >= ? AND date < ?
         ORDER BY date ASC LIMIT 1"
    ))
    .bind(teacher_id)
    .bind(start)
    .bind(end)
    .fetch_optional(pool)
    .await?;
    Ok(day)
}

/// Every session for the teacher, newest first.
pub async fn all_days(pool: &MySqlPool, teacher_id: u64) -> Result<Vec<AttendanceDay>, EngineError> {
    let days = sqlx::query_as::<_, AttendanceDay>(&format!(
        "SELECT {DAY_COLUMNS} FROM attendance_days WHERE teacher_id = ? ORDER BY date DESC"
    ))
    .bind(teacher_id)
    .fetch_all(pool)
    .await?;
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn record(student_ref: u64, roll: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            student_ref,
            student_name: format!("Student {student_ref}"),
            student_roll_no: roll.to_string(),
            status,
            marked_at: ts(8, 0),
        }
    }

    fn student(id: u64, roll: &str, name: &str) -> Student {
        Student {
            id,
            student_id: roll.to_string(),
            name: name.to_string(),
            email: None,
            class: "10".to_string(),
            section: "A".to_string(),
            profile_photo: String::new(),
            face_embedding: Json(Vec::new()),
            registered_by: Some(1),
            created_at: ts(7, 0),
            updated_at: ts(7, 0),
        }
    }

    #[test]
    fn day_window_is_half_open() {
        let (start, end) = day_window(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(start, ts(0, 0));
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn apply_marks_appends_new_students() {
        let mut records = Vec::new();
        apply_marks(
            &mut records,
            vec![
                record(1, "S1", AttendanceStatus::Present),
                record(2, "S2", AttendanceStatus::Absent),
            ],
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AttendanceStatus::Present);
        assert_eq!(records[1].status, AttendanceStatus::Absent);
    }

    #[test]
    fn apply_marks_overwrites_existing_status_and_stamp() {
        let mut records = vec![record(1, "S1", AttendanceStatus::Present)];
        let mut update = record(1, "S1", AttendanceStatus::Absent);
        update.marked_at = ts(9, 30);
        apply_marks(&mut records, vec![update]);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Absent);
        assert_eq!(records[0].marked_at, ts(9, 30));
    }

    #[test]
    fn apply_marks_same_student_twice_last_wins() {
        let mut records = Vec::new();
        apply_marks(
            &mut records,
            vec![
                record(1, "S1", AttendanceStatus::Present),
                record(1, "S1", AttendanceStatus::Late),
            ],
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Late);
    }

    #[test]
    fn append_missing_never_touches_existing_records() {
        let mut records = vec![record(1, "S1", AttendanceStatus::Absent)];
        let mut incoming = record(1, "S1", AttendanceStatus::Present);
        incoming.marked_at = ts(10, 0);
        append_missing(&mut records, vec![incoming, record(3, "S3", AttendanceStatus::Present)]);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AttendanceStatus::Absent);
        assert_eq!(records[0].marked_at, ts(8, 0));
        assert_eq!(records[1].student_roll_no, "S3");
    }

    #[test]
    fn resolve_mark_uses_placeholder_for_unknown_student() {
        let mark = Mark {
            student_ref: 99,
            status: AttendanceStatus::Present,
        };
        let rec = resolve_mark(&mark, None, ts(8, 15));
        assert_eq!(rec.student_name, "Unknown");
        assert_eq!(rec.student_roll_no, "N/A");
        assert_eq!(rec.student_ref, 99);
    }

    #[test]
    fn resolve_mark_snapshots_directory_identity() {
        let s = student(7, "S7", "Grace Hopper");
        let mark = Mark {
            student_ref: 7,
            status: AttendanceStatus::Late,
        };
        let rec = resolve_mark(&mark, Some(&s), ts(8, 15));
        assert_eq!(rec.student_name, "Grace Hopper");
        assert_eq!(rec.student_roll_no, "S7");
    }

    #[test]
    fn partition_buckets_matches_against_current_day() {
        let existing = vec![record(1, "S1", AttendanceStatus::Present)];
        let resolved = vec![
            ResolvedMatch {
                student: Some(student(1, "S1", "Already Here")),
                roll_no: "S1".to_string(),
                confidence: 0.88,
            },
            ResolvedMatch {
                student: Some(student(3, "S3", "New Face")),
                roll_no: "S3".to_string(),
                confidence: 0.92,
            },
            ResolvedMatch {
                student: None,
                roll_no: "GHOST".to_string(),
                confidence: 0.75,
            },
        ];

        let (outcome, new_records) = partition_matches(&existing, resolved, ts(9, 0));

        assert_eq!(outcome.marked.len(), 1);
        assert_eq!(outcome.marked[0].student_id, "S3");
        assert!((outcome.marked[0].confidence - 0.92).abs() < f64::EPSILON);
        assert_eq!(outcome.already_marked.len(), 1);
        assert_eq!(outcome.already_marked[0].student_id, "S1");
        assert_eq!(outcome.not_found, vec!["GHOST".to_string()]);

        assert_eq!(new_records.len(), 1);
        assert_eq!(new_records[0].status, AttendanceStatus::Present);
        assert_eq!(new_records[0].marked_at, ts(9, 0));
    }

    #[test]
    fn partition_dedupes_repeat_matches_within_one_call() {
        let resolved = vec![
            ResolvedMatch {
                student: Some(student(3, "S3", "New Face")),
                roll_no: "S3".to_string(),
                confidence: 0.92,
            },
            ResolvedMatch {
                student: Some(student(3, "S3", "New Face")),
                roll_no: "S3".to_string(),
                confidence: 0.81,
            },
        ];

        let (outcome, new_records) = partition_matches(&[], resolved, ts(9, 0));

        assert_eq!(outcome.marked.len(), 1);
        assert_eq!(new_records.len(), 1);
        assert!((outcome.marked[0].confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn error_kinds_map_to_http_status() {
        assert_eq!(
            EngineError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::ValidationFailed("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::UpstreamUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

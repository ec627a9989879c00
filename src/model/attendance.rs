use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Status of a single mark. Serialized lowercase on the wire, Display gives
/// the capitalized label used in CSV exports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

/// One student's mark inside an attendance day. Name and roll number are
/// snapshots taken at mark time so reports survive later student edits and
/// deletes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// Student row id as referenced at mark time. Kept even when the id no
    /// longer resolves in the directory.
    pub student_ref: u64,
    pub student_name: String,
    pub student_roll_no: String,
    pub status: AttendanceStatus,
    pub marked_at: NaiveDateTime,
}

/// One reconciled attendance session for (teacher, calendar day, class,
/// section). Records embed as a JSON column so every merge is a single
/// row-level write.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceDay {
    pub id: u64,
    pub teacher_id: u64,
    pub date: NaiveDateTime,
    pub class: String,
    pub section: String,
    pub subject: String,
    #[schema(value_type = Vec<AttendanceRecord>)]
    pub records: Json<Vec<AttendanceRecord>>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AttendanceStatus::Present).unwrap(),
            "\"present\""
        );
        assert_eq!(
            serde_json::from_str::<AttendanceStatus>("\"late\"").unwrap(),
            AttendanceStatus::Late
        );
    }

    #[test]
    fn status_display_is_capitalized() {
        assert_eq!(AttendanceStatus::Present.to_string(), "Present");
        assert_eq!(AttendanceStatus::Absent.to_string(), "Absent");
        assert_eq!(AttendanceStatus::Late.to_string(), "Late");
    }
}

use anyhow::Result;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::student::Student;

fn or_na(value: &str) -> &str {
    if value.is_empty() { "N/A" } else { value }
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    Ok(String::from_utf8(wtr.into_inner()?)?)
}

/// Roster export: one row per recorded mark.
/// `S.No, Student ID, Name, Status, Time`
pub fn attendance_roster_csv(records: &[AttendanceRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["S.No", "Student ID", "Name", "Status", "Time"])?;

    for (i, record) in records.iter().enumerate() {
        wtr.write_record([
            (i + 1).to_string(),
            record.student_roll_no.clone(),
            record.student_name.clone(),
            record.status.to_string(),
            record.marked_at.format("%H:%M:%S").to_string(),
        ])?;
    }

    finish(wtr)
}

/// Full-day export: one row per directory student, present or not.
/// `S.No, Student ID, Name, Class, Section, Status, Time Marked`
///
/// A student counts as Present only when a record exists with status
/// `present`; everyone else shows Absent with a `-` time.
pub fn full_day_csv(students: &[Student], records: &[AttendanceRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "S.No",
        "Student ID",
        "Name",
        "Class",
        "Section",
        "Status",
        "Time Marked",
    ])?;

    for (i, student) in students.iter().enumerate() {
        let record = records
            .iter()
            .find(|r| r.student_roll_no == student.student_id);
        let present = record.is_some_and(|r| r.status == AttendanceStatus::Present);

        wtr.write_record([
            (i + 1).to_string(),
            student.student_id.clone(),
            student.name.clone(),
            or_na(&student.class).to_string(),
            or_na(&student.section).to_string(),
            if present { "Present" } else { "Absent" }.to_string(),
            record
                .map(|r| r.marked_at.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
        ])?;
    }

    finish(wtr)
}

/// Directory export: `S.No, Student ID, Name, Email, Class, Section`.
pub fn student_list_csv(students: &[Student]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["S.No", "Student ID", "Name", "Email", "Class", "Section"])?;

    for (i, student) in students.iter().enumerate() {
        wtr.write_record([
            (i + 1).to_string(),
            student.student_id.clone(),
            student.name.clone(),
            or_na(student.email.as_deref().unwrap_or("")).to_string(),
            or_na(&student.class).to_string(),
            or_na(&student.section).to_string(),
        ])?;
    }

    finish(wtr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use sqlx::types::Json;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
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
            registered_by: None,
            created_at: ts(7, 0),
            updated_at: ts(7, 0),
        }
    }

    fn record(roll: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            student_ref: 1,
            student_name: format!("Name {roll}"),
            student_roll_no: roll.to_string(),
            status,
            marked_at: ts(8, 30),
        }
    }

    #[test]
    fn full_day_has_one_row_per_directory_student() {
        let students = vec![
            student(1, "S1", "One"),
            student(2, "S2", "Two"),
            student(3, "S3", "Three"),
        ];
        let records = vec![record("S1", AttendanceStatus::Present)];

        let out = full_day_csv(&students, &records).unwrap();
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 4); // header + 3 students
        assert!(lines[1].contains("Present"));
        assert!(lines[1].contains("08:30:00"));
        assert!(lines[2].contains("Absent"));
        assert!(lines[2].ends_with("-"));
        assert!(lines[3].contains("Absent"));
    }

    #[test]
    fn full_day_counts_late_as_absent() {
        let students = vec![student(1, "S1", "One")];
        let records = vec![record("S1", AttendanceStatus::Late)];

        let out = full_day_csv(&students, &records).unwrap();
        let row = out.lines().nth(1).unwrap();
        assert!(row.contains("Absent"));
        // time still comes from the mark
        assert!(row.contains("08:30:00"));
    }

    #[test]
    fn roster_capitalizes_status() {
        let records = vec![
            record("S1", AttendanceStatus::Present),
            record("S2", AttendanceStatus::Late),
        ];
        let out = attendance_roster_csv(&records).unwrap();
        assert!(out.starts_with("S.No,Student ID,Name,Status,Time"));
        assert!(out.contains(",Present,"));
        assert!(out.contains(",Late,"));
    }

    #[test]
    fn student_list_substitutes_na_for_missing_fields() {
        let mut s = student(1, "S1", "One");
        s.email = None;
        s.class = String::new();
        let out = student_list_csv(&[s]).unwrap();
        let row = out.lines().nth(1).unwrap();
        assert_eq!(row, "1,S1,One,N/A,N/A,A");
    }
}

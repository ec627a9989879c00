use crate::auth::auth::AuthTeacher;
use crate::engine::{self, EngineError, FaceMatch, Mark, SingleFaceOutcome};
use crate::model::student::Student;
use crate::utils::csv::{attendance_roster_csv, full_day_csv};
use crate::utils::face_api::FaceApiClient;
use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendanceReq {
    pub records: Vec<Mark>,
    pub subject: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FaceAttendanceReq {
    pub image: String,
    pub subject: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
}

async fn teacher_subject(pool: &MySqlPool, teacher_id: u64) -> Result<String, EngineError> {
    let subject =
        sqlx::query_scalar::<_, String>("SELECT subject FROM teachers WHERE id = ?")
            .bind(teacher_id)
            .fetch_optional(pool)
            .await?;
    Ok(subject.unwrap_or_default())
}

fn parse_date(raw: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        EngineError::ValidationFailed("Invalid date, expected YYYY-MM-DD".to_string())
    })
}

async fn all_students_by_roll(pool: &MySqlPool) -> Result<Vec<Student>, EngineError> {
    let students = sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY student_id ASC")
        .fetch_all(pool)
        .await?;
    Ok(students)
}

fn csv_attachment(filename: &str, body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename={filename}"),
        ))
        .body(body)
}

/// Mark attendance manually for a batch of students
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = MarkAttendanceReq,
    responses(
        (status = 201, description = "Attendance marked", body = Object, example = json!({
            "success": true,
            "message": "Attendance marked successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn mark_attendance(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    body: web::Json<MarkAttendanceReq>,
) -> actix_web::Result<HttpResponse> {
    let subject = match &body.subject {
        Some(s) if !s.is_empty() => s.clone(),
        _ => teacher_subject(pool.get_ref(), auth.teacher_id).await?,
    };

    let day = engine::mark_batch(
        pool.get_ref(),
        auth.teacher_id,
        Local::now().date_naive(),
        body.class.as_deref().unwrap_or(""),
        body.section.as_deref().unwrap_or(""),
        &subject,
        &body.records,
    )
    .await?;

    info!(
        teacher_id = auth.teacher_id,
        day_id = day.id,
        marks = body.records.len(),
        "attendance marked"
    );

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Attendance marked successfully",
        "attendance": day
    })))
}

/// All attendance sessions for the teacher, newest first
#[utoipa::path(
    get,
    path = "/api/attendance",
    responses((status = 200, description = "Attendance list")),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let days = engine::all_days(pool.get_ref(), auth.teacher_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": days.len(),
        "attendance": days
    })))
}

/// Today's attendance sessions
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses((status = 200, description = "Today's attendance")),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today_attendance(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let days =
        engine::days_for_date(pool.get_ref(), auth.teacher_id, Local::now().date_naive()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": days.len(),
        "attendance": days
    })))
}

/// Attendance sessions for a given date
#[utoipa::path(
    get,
    path = "/api/attendance/date/{date}",
    params(("date", Path, description = "Calendar date, YYYY-MM-DD")),
    responses(
        (status = 200, description = "Attendance for the date"),
        (status = 400, description = "Invalid date")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_by_date(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    let date = parse_date(&path.into_inner())?;
    let days = engine::days_for_date(pool.get_ref(), auth.teacher_id, date).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": days.len(),
        "attendance": days
    })))
}

async fn full_day_report(
    pool: &MySqlPool,
    teacher_id: u64,
    date: NaiveDate,
) -> actix_web::Result<HttpResponse> {
    let students = all_students_by_roll(pool).await?;
    if students.is_empty() {
        return Ok(HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "No students found in the system"
        })));
    }

    let day = engine::first_day_for_date(pool, teacher_id, date).await?;
    let records = day.map(|d| d.records.0).unwrap_or_default();

    let csv = full_day_csv(&students, &records)
        .map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(csv_attachment(&format!("attendance_{date}.csv"), csv))
}

/// Download today's full-day attendance report
#[utoipa::path(
    get,
    path = "/api/attendance/download/today",
    responses(
        (status = 200, description = "CSV report", content_type = "text/csv"),
        (status = 404, description = "No students in the system")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn download_today_csv(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    full_day_report(pool.get_ref(), auth.teacher_id, Local::now().date_naive()).await
}

/// Download the full-day attendance report for a date
#[utoipa::path(
    get,
    path = "/api/attendance/download/{date}",
    params(("date", Path, description = "Calendar date, YYYY-MM-DD")),
    responses(
        (status = 200, description = "CSV report", content_type = "text/csv"),
        (status = 400, description = "Invalid date"),
        (status = 404, description = "No students in the system")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn download_csv_by_date(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    let date = parse_date(&path.into_inner())?;
    full_day_report(pool.get_ref(), auth.teacher_id, date).await
}

/// Download one session's roster as CSV
#[utoipa::path(
    get,
    path = "/api/attendance/{id}/roster",
    params(("id", Path, description = "Attendance session id")),
    responses(
        (status = 200, description = "CSV roster", content_type = "text/csv"),
        (status = 404, description = "Session not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn download_roster_csv(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    let day = sqlx::query_as::<_, crate::model::attendance::AttendanceDay>(
        "SELECT id, teacher_id, date, class, section, subject, records, created_at, updated_at
         FROM attendance_days WHERE id = ? AND teacher_id = ?",
    )
    .bind(id)
    .bind(auth.teacher_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(EngineError::from)?
    .ok_or_else(|| EngineError::NotFound("Attendance session not found".to_string()))?;

    let csv = attendance_roster_csv(&day.records.0)
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(csv_attachment(
        &format!("attendance_roster_{}.csv", day.date.date()),
        csv,
    ))
}

/// Mark attendance from a single recognized face
#[utoipa::path(
    post,
    path = "/api/attendance/face",
    request_body = FaceAttendanceReq,
    responses(
        (status = 201, description = "Student marked present"),
        (status = 200, description = "Student was already marked"),
        (status = 400, description = "Face not recognized"),
        (status = 404, description = "Recognized student missing from directory"),
        (status = 503, description = "Face service unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn face_attendance(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    face: web::Data<FaceApiClient>,
    body: web::Json<FaceAttendanceReq>,
) -> actix_web::Result<HttpResponse> {
    if body.image.is_empty() {
        return Err(EngineError::ValidationFailed("Image is required".to_string()).into());
    }

    let result = face.recognize(&body.image).await?;
    if !result.success || result.students.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": result.message.unwrap_or_else(|| "Face not recognized".to_string())
        })));
    }

    let top = &result.students[0];
    let outcome = engine::mark_single_from_face(
        pool.get_ref(),
        auth.teacher_id,
        Local::now().date_naive(),
        body.class.as_deref().unwrap_or(""),
        body.section.as_deref().unwrap_or(""),
        body.subject.as_deref().unwrap_or(""),
        &top.student_id,
        top.confidence,
    )
    .await?;

    match outcome {
        SingleFaceOutcome::AlreadyMarked(student) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "message": format!("{} already marked present", student.name),
            "alreadyMarked": true,
            "student": student
        }))),
        SingleFaceOutcome::Marked(student) => Ok(HttpResponse::Created().json(json!({
            "success": true,
            "message": format!("Attendance marked for {}", student.name),
            "student": student
        }))),
    }
}

/// Mark attendance for every face recognized in a classroom photo
#[utoipa::path(
    post,
    path = "/api/attendance/face-multiple",
    request_body = FaceAttendanceReq,
    responses(
        (status = 201, description = "Recognized students marked"),
        (status = 400, description = "No faces recognized"),
        (status = 503, description = "Face service unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn face_multiple_attendance(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    face: web::Data<FaceApiClient>,
    body: web::Json<FaceAttendanceReq>,
) -> actix_web::Result<HttpResponse> {
    if body.image.is_empty() {
        return Err(EngineError::ValidationFailed("Image is required".to_string()).into());
    }

    let result = face.recognize_multiple(&body.image).await?;
    if !result.success {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": result.message.unwrap_or_else(|| "No faces recognized".to_string())
        })));
    }

    if result.recognized_students.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "No students recognized in the image",
            "totalFaces": result.total_faces,
            "unrecognizedCount": result.unrecognized_count
        })));
    }

    let matches: Vec<FaceMatch> = result
        .recognized_students
        .iter()
        .map(|s| FaceMatch {
            student_id: s.student_id.clone(),
            confidence: s.confidence,
        })
        .collect();

    let outcome = engine::mark_multiple_from_faces(
        pool.get_ref(),
        auth.teacher_id,
        Local::now().date_naive(),
        body.class.as_deref().unwrap_or(""),
        body.section.as_deref().unwrap_or(""),
        body.subject.as_deref().unwrap_or(""),
        &matches,
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": format!("Marked attendance for {} students", outcome.marked.len()),
        "totalFaces": result.total_faces,
        "markedStudents": outcome.marked,
        "alreadyMarkedStudents": outcome.already_marked,
        "notFoundStudents": outcome.not_found,
        "unrecognizedCount": result.unrecognized_count
    })))
}

/// Face recognition service health check
#[utoipa::path(
    get,
    path = "/api/attendance/face-status",
    responses((status = 200, description = "Matcher status, as reported")),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn face_status(face: web::Data<FaceApiClient>) -> HttpResponse {
    HttpResponse::Ok().json(face.health().await)
}

/// Reset today's attendance across every class and section
#[utoipa::path(
    delete,
    path = "/api/attendance/today",
    responses((status = 200, description = "Attendance reset", body = Object, example = json!({
        "success": true,
        "message": "Today's attendance has been reset. 2 record(s) deleted.",
        "deletedCount": 2
    }))),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn reset_today(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let deleted =
        engine::reset_day(pool.get_ref(), auth.teacher_id, Local::now().date_naive()).await?;

    if deleted > 0 {
        warn!(teacher_id = auth.teacher_id, deleted, "attendance reset");
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!(
            "Today's attendance has been reset. {} record(s) deleted.",
            deleted
        ),
        "deletedCount": deleted
    })))
}

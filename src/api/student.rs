use crate::auth::auth::AuthTeacher;
use crate::engine::EngineError;
use crate::model::student::Student;
use crate::utils::csv::student_list_csv;
use crate::utils::db_utils::{build_update_sql, execute_update};
use crate::utils::face_api::FaceApiClient;
use crate::utils::roll_cache;
use crate::utils::roll_filter;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{MySqlPool, types::Json};
use tracing::{error, warn};
use utoipa::ToSchema;

/// Columns a partial update may touch. The roll number is deliberately
/// excluded: it keys the face index and the roll filter.
const UPDATABLE_COLUMNS: &[&str] = &["name", "email", "class", "section", "profile_photo"];

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddStudentReq {
    #[schema(example = "STU-001")]
    pub student_id: String,
    pub name: String,
    pub email: Option<String>,
    pub class: Option<String>,
    pub section: Option<String>,
    /// Base64 face image; when present the student is enrolled with the face
    /// matcher and the returned embedding is stored.
    pub face_image: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFaceReq {
    pub face_image: String,
}

/// true  => roll number AVAILABLE
/// false => roll number TAKEN
async fn is_roll_no_available(roll_no: &str, pool: &MySqlPool) -> bool {
    // 1️⃣ Cuckoo filter — fast negative
    if !roll_filter::might_exist(roll_no) {
        return true;
    }

    // 2️⃣ Moka cache — fast positive
    if roll_cache::is_taken(roll_no).await {
        return false;
    }

    // 3️⃣ Database fallback
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM students WHERE student_id = ? LIMIT 1)",
    )
    .bind(roll_no)
    .fetch_one(pool)
    .await
    .unwrap_or(true); // fail-safe

    !exists
}

async fn student_by_id(pool: &MySqlPool, id: u64) -> Result<Option<Student>, EngineError> {
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(student)
}

/// List all students, newest first
#[utoipa::path(
    get,
    path = "/api/students",
    responses((status = 200, description = "Student list")),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn list_students(
    _auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let students =
        sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY created_at DESC")
            .fetch_all(pool.get_ref())
            .await
            .map_err(EngineError::from)?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": students.len(),
        "students": students
    })))
}

/// Get a single student
#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student row id")),
    responses(
        (status = 200, description = "Student found", body = Student),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn get_student(
    _auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let student = student_by_id(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| EngineError::NotFound("Student not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({ "success": true, "student": student })))
}

/// Add a student, optionally enrolling a face
#[utoipa::path(
    post,
    path = "/api/students",
    request_body = AddStudentReq,
    responses(
        (status = 201, description = "Student added"),
        (status = 400, description = "Duplicate roll number or face enrollment failed"),
        (status = 503, description = "Face service unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn add_student(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    face: web::Data<FaceApiClient>,
    body: web::Json<AddStudentReq>,
) -> actix_web::Result<HttpResponse> {
    let roll_no = body.student_id.trim();
    let name = body.name.trim();

    if roll_no.is_empty() || name.is_empty() {
        return Err(
            EngineError::ValidationFailed("Student ID and name are required".to_string()).into(),
        );
    }

    if !is_roll_no_available(roll_no, pool.get_ref()).await {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Student ID already exists"
        })));
    }

    let mut embedding: Vec<f64> = Vec::new();
    if let Some(face_image) = body.face_image.as_deref().filter(|s| !s.is_empty()) {
        let enrolled = face.add_student(roll_no, name, face_image).await?;
        if !enrolled.success {
            return Ok(HttpResponse::BadRequest().json(json!({
                "success": false,
                "message": enrolled
                    .message
                    .unwrap_or_else(|| "Failed to register face".to_string())
            })));
        }
        embedding = enrolled.embedding.unwrap_or_default();
    }

    let result = sqlx::query(
        r#"
        INSERT INTO students (student_id, name, email, class, section, face_embedding, registered_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(roll_no)
    .bind(name)
    .bind(body.email.as_deref().filter(|s| !s.is_empty()))
    .bind(body.class.as_deref().unwrap_or(""))
    .bind(body.section.as_deref().unwrap_or(""))
    .bind(Json(&embedding))
    .bind(auth.teacher_id)
    .execute(pool.get_ref())
    .await;

    let student_id = match result {
        Ok(res) => res.last_insert_id(),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return Ok(HttpResponse::BadRequest().json(json!({
                        "success": false,
                        "message": "Student ID already exists"
                    })));
                }
            }
            error!(error = %e, "Failed to add student");
            return Ok(HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Error adding student"
            })));
        }
    };

    roll_filter::insert(roll_no);
    roll_cache::mark_taken(roll_no).await;

    let student = student_by_id(pool.get_ref(), student_id).await?;

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Student added successfully",
        "student": student
    })))
}

/// Partial update of a student
#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student row id")),
    responses(
        (status = 200, description = "Student updated"),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn update_student(
    _auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> actix_web::Result<HttpResponse> {
    let student_id = path.into_inner();

    let update = build_update_sql("students", &body, UPDATABLE_COLUMNS, "id", student_id)?;

    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if affected == 0 {
        return Ok(HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Student not found"
        })));
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Student updated successfully"
    })))
}

/// Delete a student, removing them from the face index best-effort
#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student row id")),
    responses(
        (status = 200, description = "Student deleted"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn delete_student(
    _auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    face: web::Data<FaceApiClient>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let student = student_by_id(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| EngineError::NotFound("Student not found".to_string()))?;

    // Face-index removal must not block directory deletion.
    if let Err(e) = face.remove_student(&student.student_id).await {
        warn!(error = %e, roll_no = %student.student_id, "failed to remove from face index");
    }

    sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(student.id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::from)?;

    roll_filter::remove(&student.student_id);
    roll_cache::invalidate(&student.student_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Student deleted successfully"
    })))
}

/// Enroll or refresh a face for an existing student
#[utoipa::path(
    post,
    path = "/api/students/{id}/register-face",
    params(("id", Path, description = "Student row id")),
    request_body = RegisterFaceReq,
    responses(
        (status = 200, description = "Face registered"),
        (status = 400, description = "Enrollment failed"),
        (status = 404, description = "Student not found"),
        (status = 503, description = "Face service unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn register_face(
    _auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    face: web::Data<FaceApiClient>,
    path: web::Path<u64>,
    body: web::Json<RegisterFaceReq>,
) -> actix_web::Result<HttpResponse> {
    if body.face_image.is_empty() {
        return Err(EngineError::ValidationFailed("Face image is required".to_string()).into());
    }

    let student = student_by_id(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| EngineError::NotFound("Student not found".to_string()))?;

    let enrolled = face
        .add_student(&student.student_id, &student.name, &body.face_image)
        .await?;
    if !enrolled.success {
        return Ok(HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": enrolled
                .message
                .unwrap_or_else(|| "Failed to register face".to_string())
        })));
    }

    if let Some(embedding) = enrolled.embedding {
        sqlx::query("UPDATE students SET face_embedding = ? WHERE id = ?")
            .bind(Json(&embedding))
            .bind(student.id)
            .execute(pool.get_ref())
            .await
            .map_err(EngineError::from)?;
    }

    let student = student_by_id(pool.get_ref(), student.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Face registered successfully",
        "student": student
    })))
}

/// Download the student directory as CSV
#[utoipa::path(
    get,
    path = "/api/students/download/csv",
    responses((status = 200, description = "CSV list", content_type = "text/csv")),
    security(("bearer_auth" = [])),
    tag = "Students"
)]
pub async fn download_students_csv(
    _auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let students =
        sqlx::query_as::<_, Student>("SELECT * FROM students ORDER BY created_at DESC")
            .fetch_all(pool.get_ref())
            .await
            .map_err(EngineError::from)?;

    let csv = student_list_csv(&students).map_err(actix_web::error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=students_list.csv",
        ))
        .body(csv))
}

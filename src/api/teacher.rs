use crate::auth::auth::AuthTeacher;
use crate::auth::password::{hash_password, verify_password};
use crate::engine::EngineError;
use crate::model::teacher::Teacher;
use crate::utils::db_utils::{build_update_sql, execute_update};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

const UPDATABLE_COLUMNS: &[&str] = &["name", "subject", "description", "profile_photo"];

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
}

/// Get the authenticated teacher's profile
#[utoipa::path(
    get,
    path = "/api/teacher/profile",
    responses(
        (status = 200, description = "Teacher profile", body = Teacher),
        (status = 404, description = "Teacher not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Teacher"
)]
pub async fn get_profile(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<HttpResponse> {
    let teacher = sqlx::query_as::<_, Teacher>("SELECT * FROM teachers WHERE id = ?")
        .bind(auth.teacher_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(EngineError::from)?
        .ok_or_else(|| EngineError::NotFound("Teacher not found".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({ "success": true, "teacher": teacher })))
}

/// Partial update of the teacher's profile
#[utoipa::path(
    put,
    path = "/api/teacher/profile",
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Teacher not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Teacher"
)]
pub async fn update_profile(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    body: web::Json<Value>,
) -> actix_web::Result<HttpResponse> {
    let update = build_update_sql(
        "teachers",
        &body,
        UPDATABLE_COLUMNS,
        "id",
        auth.teacher_id as i64,
    )?;

    let affected = execute_update(pool.get_ref(), update)
        .await
        .map_err(actix_web::error::ErrorInternalServerError)?;

    if affected == 0 {
        return Ok(HttpResponse::NotFound().json(json!({
            "success": false,
            "message": "Teacher not found"
        })));
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Profile updated successfully"
    })))
}

/// Change the teacher's password after verifying the current one
#[utoipa::path(
    put,
    path = "/api/teacher/change-password",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Weak new password"),
        (status = 401, description = "Current password incorrect")
    ),
    security(("bearer_auth" = [])),
    tag = "Teacher"
)]
pub async fn change_password(
    auth: AuthTeacher,
    pool: web::Data<MySqlPool>,
    body: web::Json<ChangePasswordReq>,
) -> actix_web::Result<HttpResponse> {
    if body.new_password.len() < 6 {
        return Err(EngineError::ValidationFailed(
            "Password must be at least 6 characters".to_string(),
        )
        .into());
    }

    let current_hash =
        sqlx::query_scalar::<_, String>("SELECT password FROM teachers WHERE id = ?")
            .bind(auth.teacher_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::NotFound("Teacher not found".to_string()))?;

    if verify_password(&body.current_password, &current_hash).is_err() {
        return Ok(HttpResponse::Unauthorized().json(json!({
            "success": false,
            "message": "Current password is incorrect"
        })));
    }

    let new_hash = hash_password(&body.new_password);
    sqlx::query("UPDATE teachers SET password = ? WHERE id = ?")
        .bind(&new_hash)
        .bind(auth.teacher_id)
        .execute(pool.get_ref())
        .await
        .map_err(EngineError::from)?;

    info!(teacher_id = auth.teacher_id, "password changed");

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Password changed successfully"
    })))
}

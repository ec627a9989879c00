use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    models::{LoginReqDto, RegisterReqDto, TeacherCredSql, TokenType},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

async fn store_refresh_token(
    pool: &MySqlPool,
    teacher_id: u64,
    jti: &str,
    exp: usize,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (teacher_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(teacher_id)
    .bind(jti)
    .bind(exp as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Teacher registration handler
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReqDto,
    responses(
        (status = 201, description = "Teacher registered", body = Object, example = json!({
            "success": true,
            "accessToken": "...",
            "refreshToken": "..."
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    body: web::Json<RegisterReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let name = body.name.trim();
    let email = body.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Name and email must not be empty"
        }));
    }

    if body.password.len() < 6 {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Password must be at least 6 characters"
        }));
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM teachers WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool.get_ref())
    .await
    .unwrap_or(true); // fail-safe

    if exists {
        return HttpResponse::Conflict().json(json!({
            "success": false,
            "message": "Email already registered"
        }));
    }

    let hashed = hash_password(&body.password);
    let subject = body.subject.as_deref().unwrap_or("");

    let result = sqlx::query(
        r#"INSERT INTO teachers (name, email, password, subject) VALUES (?, ?, ?, ?)"#,
    )
    .bind(name)
    .bind(&email)
    .bind(&hashed)
    .bind(subject)
    .execute(pool.get_ref())
    .await;

    let teacher_id = match result {
        Ok(res) => res.last_insert_id(),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.code().as_deref() == Some("23000") {
                    return HttpResponse::Conflict().json(json!({
                        "success": false,
                        "message": "Email already registered"
                    }));
                }
            }
            error!(error = %e, "Failed to register teacher");
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "message": "Failed to register teacher"
            }));
        }
    };

    let access_token = generate_access_token(
        teacher_id,
        email.clone(),
        &config.jwt_secret,
        config.access_token_ttl,
    );
    let (refresh_token, refresh_claims) = generate_refresh_token(
        teacher_id,
        email.clone(),
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    if let Err(e) = store_refresh_token(
        pool.get_ref(),
        teacher_id,
        &refresh_claims.jti,
        refresh_claims.exp,
    )
    .await
    {
        error!(error = %e, "Failed to store refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Created().json(json!({
        "success": true,
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "teacher": { "id": teacher_id, "name": name, "email": email, "subject": subject }
    }))
}

/// Teacher login handler
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = Object, example = json!({
            "accessToken": "...",
            "refreshToken": "..."
        })),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, body),
    fields(email = %body.email)
)]
pub async fn login(
    body: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if body.email.trim().is_empty() || body.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().body("Email or password required");
    }

    debug!("Fetching teacher from database");

    let teacher = match sqlx::query_as::<_, TeacherCredSql>(
        r#"SELECT id, email, password FROM teachers WHERE email = ?"#,
    )
    .bind(body.email.trim().to_lowercase())
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(Some(t)) => {
            debug!(teacher_id = t.id, "Teacher found");
            t
        }
        Ok(None) => {
            info!("Invalid credentials: teacher not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching teacher");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = verify_password(&body.password, &teacher.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    debug!("Password verified");

    let access_token = generate_access_token(
        teacher.id,
        teacher.email.clone(),
        &config.jwt_secret,
        config.access_token_ttl,
    );

    let (refresh_token, refresh_claims) = generate_refresh_token(
        teacher.id,
        teacher.email.clone(),
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    debug!(teacher_id = teacher.id, jti = %refresh_claims.jti, "Storing refresh token");

    if let Err(e) = store_refresh_token(
        pool.get_ref(),
        teacher.id,
        &refresh_claims.jti,
        refresh_claims.exp,
    )
    .await
    {
        error!(error = %e, "Failed to store refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    info!("Login successful");

    HttpResponse::Ok().json(json!({
        "accessToken": access_token,
        "refreshToken": refresh_token
    }))
}

/// Rotate a refresh token and issue a fresh access token.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair issued"),
        (status = 401, description = "Invalid or revoked refresh token")
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let header = match req.headers().get("Authorization") {
        Some(h) => h.to_str().unwrap_or(""),
        None => return HttpResponse::Unauthorized().body("No token"),
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return HttpResponse::Unauthorized().body("Invalid token"),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::Unauthorized().finish(),
    };

    if claims.token_type != TokenType::Refresh {
        return HttpResponse::Unauthorized().finish();
    }

    let record = match sqlx::query_as::<_, (u64, u64, i8)>(
        r#"SELECT id, teacher_id, revoked FROM refresh_tokens WHERE jti = ?"#,
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await
    {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "Failed to look up refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let (record_id, teacher_id) = match record {
        Some((id, teacher_id, revoked)) if revoked == 0 => (id, teacher_id),
        _ => return HttpResponse::Unauthorized().finish(),
    };

    // Rotation: the presented refresh token is revoked before a new pair is
    // issued.
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ?")
        .bind(record_id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    let (new_refresh_token, new_claims) = generate_refresh_token(
        teacher_id,
        claims.sub.clone(),
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    if let Err(e) =
        store_refresh_token(pool.get_ref(), teacher_id, &new_claims.jti, new_claims.exp).await
    {
        error!(error = %e, "Failed to store rotated refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    let access_token = generate_access_token(
        teacher_id,
        claims.sub.clone(),
        &config.jwt_secret,
        config.access_token_ttl,
    );

    HttpResponse::Ok().json(json!({
        "accessToken": access_token,
        "refreshToken": new_refresh_token
    }))
}

/// Revoke the presented refresh token. Succeeds even if it never existed.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let header = match req.headers().get("Authorization") {
        Some(h) => h.to_str().unwrap_or(""),
        None => return HttpResponse::NoContent().finish(),
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return HttpResponse::NoContent().finish(),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    let _ = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await;

    HttpResponse::NoContent().finish()
}

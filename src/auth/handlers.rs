use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{ApiError, map_unique_violation},
    model::{role::Role, user::User},
    models::{LoginReqDto, RegisterReq, TokenType},
    notify::Notifier,
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::utils::email_cache;
use crate::utils::email_filter;

// auth end points

/// Inserts a new user and keeps the email filter/cache populated.
async fn insert_user(req: &RegisterReq, pool: &PgPool) -> Result<User, ApiError> {
    let hashed = hash_password(&req.password);

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password, role, department, position)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(req.name.trim())
    .bind(req.email.trim().to_lowercase())
    .bind(&hashed)
    .bind(Role::Employee.as_str())
    .bind(&req.department)
    .bind(&req.position)
    .fetch_one(pool)
    .await
    .map_err(|e| map_unique_violation(e, "Email already registered"))?;

    email_filter::insert(&user.email);
    email_cache::mark_taken(&user.email).await;

    Ok(user)
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &PgPool) -> bool {
    let email = email.to_lowercase();

    // 1. Cuckoo filter: a definite "never seen" answers without any I/O
    if !email_filter::might_exist(&email) {
        return true;
    }

    // 2. Moka cache: fast positive
    if email_cache::is_taken(&email).await {
        return false;
    }

    // 3. Database fallback
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .unwrap_or(true); // fail-safe

    !exists
}

/// User registration handler
pub async fn register(
    req: web::Json<RegisterReq>,
    pool: web::Data<PgPool>,
    notifier: web::Data<dyn Notifier>,
) -> Result<HttpResponse, ApiError> {
    let email = req.email.trim();

    if req.name.trim().is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation(
            "Name, email and password must not be empty".to_string(),
        ));
    }

    if !is_email_available(email, pool.get_ref()).await {
        return Err(ApiError::Validation("Email already registered".to_string()));
    }

    // The insert still translates a unique violation, so a racing duplicate
    // past the availability probe stays a domain 400.
    let user = insert_user(&req, pool.get_ref()).await?;

    let notifier = notifier.clone();
    actix_web::rt::spawn(async move {
        notifier.welcome(&user);
    });

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "User registered successfully"
    })))
}

#[derive(Serialize, Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    user_id: Uuid,
    revoked: bool,
}

#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "message": "Email or password required"
        }));
    }

    debug!("Fetching user from database");

    let db_user = match sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(user.email.trim().to_lowercase())
        .fetch_optional(pool.get_ref())
        .await
    {
        Ok(Some(user)) => {
            debug!(user_id = %user.id, "User found");
            user
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().json(json!({
                "success": false,
                "message": "Invalid credentials"
            }));
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    debug!("Verifying password");

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().json(json!({
            "success": false,
            "message": "Invalid credentials"
        }));
    }

    debug!("Generating access token");

    let access_token = generate_access_token(
        db_user.id,
        db_user.email.clone(),
        db_user.role.clone(),
        &config.jwt_secret,
        config.access_token_ttl,
    );

    debug!("Generating refresh token");

    let (refresh_token, refresh_claims) = generate_refresh_token(
        db_user.id,
        db_user.email.clone(),
        db_user.role.clone(),
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    debug!(
        user_id = %db_user.id,
        jti = %refresh_claims.jti,
        "Storing refresh token"
    );

    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES ($1, $2, TO_TIMESTAMP($3))
        "#,
    )
    .bind(db_user.id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool.get_ref())
    .await
    {
        error!(error = %e, "Failed to store refresh token");
        return HttpResponse::InternalServerError().finish();
    }

    debug!("Updating last_login_at");

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
        // intentionally not failing login
    }

    info!("Login successful");

    HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
    })
}

pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<PgPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let header = match req.headers().get("Authorization") {
        Some(h) => h.to_str().unwrap_or(""),
        None => return Ok(HttpResponse::Unauthorized().body("No token")),
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(t) => t,
        None => return Ok(HttpResponse::Unauthorized().body("Invalid token")),
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return Ok(HttpResponse::Unauthorized().finish()),
    };

    if claims.token_type != TokenType::Refresh {
        return Ok(HttpResponse::Unauthorized().finish());
    }

    let record = sqlx::query_as::<_, RefreshTokenRow>(
        "SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = $1",
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let record = match record {
        Some(r) if !r.revoked => r,
        _ => return Ok(HttpResponse::Unauthorized().finish()),
    };

    // revoke old refresh token
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1")
        .bind(record.id)
        .execute(pool.get_ref())
        .await?;

    // issue new refresh token
    let (new_refresh_token, new_claims) = generate_refresh_token(
        claims.user_id,
        claims.sub.clone(),
        claims.role.clone(),
        &config.jwt_secret,
        config.refresh_token_ttl,
    );

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES ($1, $2, TO_TIMESTAMP($3))
        "#,
    )
    .bind(record.user_id)
    .bind(&new_claims.jti)
    .bind(new_claims.exp as i64)
    .execute(pool.get_ref())
    .await?;

    // new access token
    let access_token = generate_access_token(
        claims.user_id,
        claims.sub.clone(),
        claims.role.clone(),
        &config.jwt_secret,
        config.access_token_ttl,
    );

    Ok(HttpResponse::Ok().json(json!({
        "access_token": access_token,
        "refresh_token": new_refresh_token
    })))
}

pub async fn logout(
    req: HttpRequest,
    pool: web::Data<PgPool>,
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

    // only refresh tokens can logout
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    // revoke refresh token (idempotent, succeeds even if it never existed)
    let _ = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await;

    HttpResponse::NoContent().finish()
}

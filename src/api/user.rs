use crate::auth::auth::AuthUser;
use crate::error::{ApiError, map_unique_violation};
use crate::model::role::Role;
use crate::utils::db_utils::{SqlValue, build_update_sql, execute_update};
use crate::utils::{email_cache, email_filter};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

/// Public view of a user row; the password column is never selected.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[schema(example = "employee")]
    pub role: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

const USER_COLUMNS: &str =
    "id, name, email, role, department, position, active, created_at, last_login_at";

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

/// Explicit patch: only the listed columns may change, each independently
/// optional.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserReq {
    pub name: Option<String>,
    pub email: Option<String>,
    #[schema(example = "employee")]
    pub role: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileReq {
    pub name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

async fn fetch_user(pool: &PgPool, id: Uuid) -> Result<UserResponse, ApiError> {
    sqlx::query_as::<_, UserResponse>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// List users (admin only)
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Users returned", body = Object, example = json!({
            "success": true,
            "count": 1,
            "data": []
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<UserListQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin("Admin only")?;

    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;
    let search = format!("%{}%", query.search.as_deref().unwrap_or(""));

    let users = sqlx::query_as::<_, UserResponse>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        WHERE name ILIKE $1 OR email ILIKE $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(&search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": users.len(),
        "data": users,
    })))
}

/// Get a single user (self or admin)
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    responses(
        (status = 200, description = "User returned"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let target = path.into_inner();
    if target != auth.user_id {
        auth.require_admin("Admin only")?;
    }

    let user = fetch_user(pool.get_ref(), target).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": user,
    })))
}

/// Update a user (admin only)
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    request_body = UpdateUserReq,
    responses(
        (status = 200, description = "User updated"),
        (status = 400, description = "No fields provided or invalid role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateUserReq>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin("Admin only")?;

    let target = path.into_inner();
    let payload = payload.into_inner();

    if let Some(role) = &payload.role {
        if Role::from_str(role).is_none() {
            return Err(ApiError::Validation(format!("Unknown role: {role}")));
        }
    }

    let new_email = payload.email.as_ref().map(|e| e.trim().to_lowercase());

    // An email change frees the previous address, so remember it before the
    // row is overwritten.
    let previous_email = match &new_email {
        Some(_) => {
            sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
                .bind(target)
                .fetch_optional(pool.get_ref())
                .await?
        }
        None => None,
    };

    let mut fields = Vec::new();
    if let Some(name) = payload.name {
        fields.push(("name", SqlValue::String(name)));
    }
    if let Some(email) = new_email.clone() {
        fields.push(("email", SqlValue::String(email)));
    }
    if let Some(role) = payload.role {
        fields.push(("role", SqlValue::String(role)));
    }
    if let Some(department) = payload.department {
        fields.push(("department", SqlValue::String(department)));
    }
    if let Some(position) = payload.position {
        fields.push(("position", SqlValue::String(position)));
    }
    if let Some(active) = payload.active {
        fields.push(("active", SqlValue::Bool(active)));
    }

    let update = build_update_sql("users", fields, "id")?;
    let affected = execute_update(pool.get_ref(), update, target)
        .await
        .map_err(|e| map_unique_violation(e, "Email already registered"))?;

    if affected == 0 {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    if let Some(email) = new_email {
        if previous_email.as_deref() != Some(email.as_str()) {
            if let Some(old) = previous_email {
                email_filter::remove(&old);
                email_cache::unmark(&old).await;
            }
            email_filter::insert(&email);
            email_cache::mark_taken(&email).await;
        }
    }

    let user = fetch_user(pool.get_ref(), target).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": user,
    })))
}

/// Delete a user (admin only)
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    responses(
        (status = 200, description = "User deleted", body = Object, example = json!({
            "success": true,
            "message": "User deleted successfully"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin("Admin only")?;

    let target = path.into_inner();

    let email =
        sqlx::query_scalar::<_, String>("DELETE FROM users WHERE id = $1 RETURNING email")
            .bind(target)
            .fetch_optional(pool.get_ref())
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    // the address is available again
    email_filter::remove(&email);
    email_cache::unmark(&email).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "User deleted successfully",
    })))
}

/// Profile of the calling user
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Profile returned"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn get_profile(
    auth: AuthUser,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, ApiError> {
    let user = fetch_user(pool.get_ref(), auth.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": user,
    })))
}

/// Update the calling user's profile
#[utoipa::path(
    put,
    path = "/api/profile",
    request_body = UpdateProfileReq,
    responses(
        (status = 200, description = "Profile updated"),
        (status = 400, description = "No fields provided"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Users"
)]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    payload: web::Json<UpdateProfileReq>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();

    let mut fields = Vec::new();
    if let Some(name) = payload.name {
        fields.push(("name", SqlValue::String(name)));
    }
    if let Some(department) = payload.department {
        fields.push(("department", SqlValue::String(department)));
    }
    if let Some(position) = payload.position {
        fields.push(("position", SqlValue::String(position)));
    }

    let update = build_update_sql("users", fields, "id")?;
    execute_update(pool.get_ref(), update, auth.user_id).await?;

    let user = fetch_user(pool.get_ref(), auth.user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": user,
    })))
}

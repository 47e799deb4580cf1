use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::ApiError;
use crate::geo::{ScanLocation, is_within_radius};
use crate::model::attendance::{
    AttendanceRecord, AttendanceType, STATUS_SUSPICIOUS, STATUS_VALID,
};
use crate::model::user::User;
use crate::notify::Notifier;
use crate::qr::{self, QrStore};
use crate::summary::{self, StatsUser};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use sqlx::types::Json;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub qr_id: Option<String>,
    pub location: Option<ScanLocation>,
    pub device_info: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SummaryQuery {
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub department: Option<String>,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::from_hms_opt(23, 59, 59).expect("valid time"))
        .and_utc()
}

/// Generate a QR code for attendance
#[utoipa::path(
    get,
    path = "/api/attendance/qrcode",
    responses(
        (status = 200, description = "QR code issued", body = Object, example = json!({
            "success": true,
            "qrId": "a3f9c2e1d4b5a6978877665544332211",
            "qrImage": "data:image/svg+xml;base64,..."
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Only admins can generate QR codes")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn generate_qr(
    auth: AuthUser,
    store: web::Data<QrStore>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin("Only admins can generate QR codes")?;

    let token = store.issue(auth.user_id);
    let qr_image = qr::render_data_url(&token.id)
        .map_err(|e| ApiError::Internal(format!("QR render failed: {e}")))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "qrId": token.id,
        "qrImage": qr_image,
    })))
}

/// Scan a QR code for check-in/check-out
#[utoipa::path(
    post,
    path = "/api/attendance/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Attendance recorded", body = Object, example = json!({
            "success": true,
            "message": "Check-in successful"
        })),
        (status = 400, description = "Missing, invalid or expired QR code"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn scan(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    store: web::Data<QrStore>,
    config: web::Data<Config>,
    notifier: web::Data<dyn Notifier>,
    req: HttpRequest,
    body: web::Json<ScanRequest>,
) -> Result<HttpResponse, ApiError> {
    let qr_id = body
        .qr_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("QR code ID is required".to_string()))?;

    store
        .validate(qr_id)
        .map_err(|e| ApiError::Token(e.to_string()))?;

    // Infer check-in vs check-out from the user's latest record. This read
    // and the insert below are separate statements, so two concurrent scans
    // by the same user can both see the same predecessor.
    let last = sqlx::query_scalar::<_, String>(
        "SELECT type FROM attendance WHERE user_id = $1 ORDER BY timestamp DESC LIMIT 1",
    )
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await?;

    let kind = AttendanceType::next(last.as_deref().and_then(AttendanceType::from_str));

    let ip_address = req
        .connection_info()
        .realip_remote_addr()
        .map(|ip| ip.to_string());

    // Geofence only applies when both coordinates were reported.
    let point = body.location.as_ref().and_then(ScanLocation::point);
    let (status, notes) = match (&body.location, point) {
        (Some(location), Some(_)) => {
            if is_within_radius(
                location,
                config.office_location(),
                config.max_distance_meters,
            ) {
                (STATUS_VALID, None)
            } else {
                (
                    STATUS_SUSPICIOUS,
                    Some("Location is outside the allowed radius".to_string()),
                )
            }
        }
        _ => (STATUS_VALID, None),
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let record = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        INSERT INTO attendance
        (user_id, type, qr_id, location, ip_address, device_info, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(kind.as_str())
    .bind(qr_id)
    .bind(point.map(Json))
    .bind(&ip_address)
    .bind(&body.device_info)
    .bind(status)
    .bind(&notes)
    .fetch_one(pool.get_ref())
    .await?;

    // Tokens are single-use: consume after the insert committed.
    store.remove(qr_id);

    // Notifications are best-effort from here on; the record is durable.
    if record.status == STATUS_SUSPICIOUS {
        match sqlx::query_scalar::<_, String>(
            "SELECT email FROM users WHERE role = 'admin' AND active = TRUE",
        )
        .fetch_all(pool.get_ref())
        .await
        {
            Ok(admin_emails) if !admin_emails.is_empty() => {
                let notifier = notifier.clone();
                let user = user.clone();
                let alert_record = record.clone();
                actix_web::rt::spawn(async move {
                    notifier.location_alert(&admin_emails, &user, &alert_record);
                });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to load admin emails for location alert");
            }
        }
    }

    {
        let notifier = notifier.clone();
        let user = user.clone();
        let confirm_record = record.clone();
        actix_web::rt::spawn(async move {
            notifier.attendance_confirmation(&user, &confirm_record);
        });
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": format!("{} successful", kind.label()),
        "attendance": record,
    })))
}

async fn fetch_history(
    pool: &PgPool,
    target: Uuid,
    filter: &HistoryQuery,
) -> Result<Vec<AttendanceRecord>, ApiError> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM attendance WHERE user_id = ");
    query.push_bind(target);

    if let Some(start) = filter.start_date {
        query.push(" AND timestamp >= ");
        query.push_bind(day_start(start));
    }
    if let Some(end) = filter.end_date {
        query.push(" AND timestamp <= ");
        query.push_bind(day_end(end));
    }
    if let Some(kind) = &filter.kind {
        query.push(" AND type = ");
        query.push_bind(kind.clone());
    }
    if let Some(status) = &filter.status {
        query.push(" AND status = ");
        query.push_bind(status.clone());
    }

    query.push(" ORDER BY timestamp DESC");

    Ok(query
        .build_query_as::<AttendanceRecord>()
        .fetch_all(pool)
        .await?)
}

async fn history_response(
    pool: &PgPool,
    target: Uuid,
    filter: &HistoryQuery,
) -> Result<HttpResponse, ApiError> {
    let records = fetch_history(pool, target, filter).await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "count": records.len(),
        "data": records,
    })))
}

/// Attendance history for the calling user
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    responses(
        (status = 200, description = "History returned", body = Object, example = json!({
            "success": true,
            "count": 2,
            "data": []
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    filter: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    history_response(pool.get_ref(), auth.user_id, &filter).await
}

/// Attendance history for another user (self or admin)
#[utoipa::path(
    get,
    path = "/api/attendance/history/{user_id}",
    responses(
        (status = 200, description = "History returned"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Accessing another user's data without admin role")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn history_for(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    filter: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let target = path.into_inner();
    auth.require_self_or_admin(target)?;
    history_response(pool.get_ref(), target, &filter).await
}

async fn summary_response(
    pool: &PgPool,
    target: Uuid,
    query: &SummaryQuery,
) -> Result<HttpResponse, ApiError> {
    let now = Utc::now();
    let month = query.month.unwrap_or_else(|| now.month());
    let year = query.year.unwrap_or_else(|| now.year());

    let (start, end) = summary::month_bounds(year, month)
        .ok_or_else(|| ApiError::Validation("Invalid month or year".to_string()))?;

    let records = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT * FROM attendance
        WHERE user_id = $1 AND timestamp BETWEEN $2 AND $3
        ORDER BY timestamp ASC
        "#,
    )
    .bind(target)
    .bind(day_start(start))
    .bind(day_end(end))
    .fetch_all(pool)
    .await?;

    let summary = summary::monthly_summary(&records, year, month)
        .ok_or_else(|| ApiError::Validation("Invalid month or year".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "summary": summary,
    })))
}

/// Monthly attendance summary for the calling user
#[utoipa::path(
    get,
    path = "/api/attendance/summary",
    responses(
        (status = 200, description = "Summary returned"),
        (status = 400, description = "Invalid month or year"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn summary(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ApiError> {
    summary_response(pool.get_ref(), auth.user_id, &query).await
}

/// Monthly attendance summary for another user (self or admin)
#[utoipa::path(
    get,
    path = "/api/attendance/summary/{user_id}",
    responses(
        (status = 200, description = "Summary returned"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Accessing another user's data without admin role")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn summary_for(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
    query: web::Query<SummaryQuery>,
) -> Result<HttpResponse, ApiError> {
    let target = path.into_inner();
    auth.require_self_or_admin(target)?;
    summary_response(pool.get_ref(), target, &query).await
}

/// Attendance statistics across users (admin only)
#[utoipa::path(
    get,
    path = "/api/attendance/stats",
    responses(
        (status = 200, description = "Statistics returned"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Only admins can access attendance statistics")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn stats(
    auth: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    auth.require_admin("Only admins can access attendance statistics")?;

    let now = Utc::now();
    let (default_start, default_end) = summary::month_bounds(now.year(), now.month())
        .ok_or_else(|| ApiError::Internal("current month out of range".to_string()))?;

    let start = query.start_date.unwrap_or(default_start);
    let end = query.end_date.unwrap_or(default_end);

    let mut user_query =
        QueryBuilder::<Postgres>::new("SELECT id, name, department FROM users WHERE active = TRUE");
    if let Some(department) = &query.department {
        user_query.push(" AND department = ");
        user_query.push_bind(department.clone());
    }
    // stable row order keeps the report identical across identical calls
    user_query.push(" ORDER BY name, id");
    let users = user_query
        .build_query_as::<StatsUser>()
        .fetch_all(pool.get_ref())
        .await?;

    let records = sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT * FROM attendance
        WHERE timestamp BETWEEN $1 AND $2
        ORDER BY timestamp ASC
        "#,
    )
    .bind(day_start(start))
    .bind(day_end(end))
    .fetch_all(pool.get_ref())
    .await?;

    let report = summary::period_stats(&users, &records, start, end);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "stats": report,
    })))
}

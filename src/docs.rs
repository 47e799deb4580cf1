use crate::api::attendance::{HistoryQuery, ScanRequest, StatsQuery, SummaryQuery};
use crate::api::user::{UpdateProfileReq, UpdateUserReq, UserListQuery, UserResponse};
use crate::geo::{GeoPoint, ScanLocation};
use crate::model::attendance::AttendanceRecord;
use crate::models::{LoginReqDto, RegisterReq};
use crate::summary::{
    DailySummary, DayStatus, DepartmentStats, MonthlySummary, OverallStats, PeriodStats,
    StatsReport, UserStats,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "QR Attendance API",
        version = "1.0.0",
        description = r#"
## QR Attendance System

This API powers an attendance-tracking backend built around short-lived QR codes.

### 🔹 Key Features
- **QR Check-In/Check-Out**
  - Admins issue 30-second QR codes; employees scan to toggle check-in/check-out
- **Geofencing**
  - Device-reported coordinates are validated against the office radius; out-of-range scans are flagged and admins alerted
- **History & Summaries**
  - Per-user history with filters, monthly summaries with late/early flags, and organization-wide statistics
- **User Management**
  - Registration, profiles, and admin user administration

### 🔐 Security
Most endpoints are protected using **JWT Bearer authentication**.
QR code issuance and cross-user statistics require the **admin** role.

### 📦 Response Format
- JSON-based RESTful responses with a `success` flag

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::generate_qr,
        crate::api::attendance::scan,
        crate::api::attendance::history,
        crate::api::attendance::history_for,
        crate::api::attendance::summary,
        crate::api::attendance::summary_for,
        crate::api::attendance::stats,

        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::update_user,
        crate::api::user::delete_user,
        crate::api::user::get_profile,
        crate::api::user::update_profile,
    ),
    components(
        schemas(
            ScanRequest,
            HistoryQuery,
            SummaryQuery,
            StatsQuery,
            GeoPoint,
            ScanLocation,
            AttendanceRecord,
            DailySummary,
            DayStatus,
            MonthlySummary,
            PeriodStats,
            OverallStats,
            DepartmentStats,
            UserStats,
            StatsReport,
            UserResponse,
            UserListQuery,
            UpdateUserReq,
            UpdateProfileReq,
            RegisterReq,
            LoginReqDto,
        )
    ),
    tags(
        (name = "Attendance", description = "QR attendance APIs"),
        (name = "Users", description = "User management APIs"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_defines_the_bearer_auth_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("document has components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}

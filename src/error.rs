use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Central error taxonomy for the API.
///
/// Validation and token errors map to 400, role mismatches to 403, missing
/// resources to 404. Storage failures surface as an opaque 500 in release
/// builds; debug builds attach the underlying message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Token(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Token(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                if cfg!(debug_assertions) {
                    e.to_string()
                } else {
                    "Server error".to_string()
                }
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal error");
                if cfg!(debug_assertions) {
                    msg.clone()
                } else {
                    "Server error".to_string()
                }
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "message": message,
        }))
    }
}

/// Translate a unique-constraint violation into a domain-level 400 instead of
/// leaking the raw storage error. Both registration and admin email updates
/// route their insert/update errors through here.
pub fn map_unique_violation(err: sqlx::Error, message: &str) -> ApiError {
    if let sqlx::Error::Database(db_err) = &err {
        // 23505 = unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return ApiError::Validation(message.to_string());
        }
    }
    ApiError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Token("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Forbidden("x".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_unique_database_errors_pass_through() {
        let err = map_unique_violation(sqlx::Error::RowNotFound, "Email already registered");
        assert!(matches!(err, ApiError::Database(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

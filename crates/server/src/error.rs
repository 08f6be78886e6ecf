//! HTTP error mapping
//!
//! Every handler failure renders as `{"error": {"kind", "message"}}` with
//! a stable machine-readable kind, so clients can branch without parsing
//! prose.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use edgemesh_db::DbError;

/// Result alias for handler bodies.
pub type ApiResult<T> = Result<T, ApiError>;

/// Error kinds surfaced to HTTP callers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed before any transaction opened
    #[error("{0}")]
    BadRequest(String),

    /// Referenced node, job, or task does not exist
    #[error("{0}")]
    NotFound(String),

    /// Shared secret missing or mismatched
    #[error("{0}")]
    Unauthorized(String),

    /// Request conflicts with current state
    #[error("{0}")]
    Conflict(String),

    /// Store or internal failure; the transaction rolled back
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Conflict(_) => "conflict",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a bad-request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(msg) => ApiError::BadRequest(msg),
            DbError::NotFound(msg) => ApiError::NotFound(msg),
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            other => {
                error!(error = %other, "Store failure");
                ApiError::Internal("store failure".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_map_to_http_kinds() {
        let err: ApiError = DbError::not_found("task 'x'").into();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = DbError::validation("bad cap").into();
        assert_eq!(err.kind(), "bad_request");

        let err: ApiError = DbError::generic("disk on fire").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

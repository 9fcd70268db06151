//! HTTP error types for the `homeguard` server.
//!
//! Maps domain errors from `homeguard-core` into HTTP responses. API errors
//! produce a JSON body with a machine-readable `error` field and a
//! human-readable `message`. An invalid restore key is shown to whoever
//! followed the link, so it is rendered as plain text.

use axum::http::StatusCode;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use homeguard_core::error::RestoreError;
use homeguard_storage::StorageError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// A presented restore key was rejected. Ends the request.
    InvalidRestoreKey,
    /// API token missing or wrong.
    Unauthorized(String),
    /// Requested resource not found.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::InvalidRestoreKey => {
                return (
                    StatusCode::FORBIDDEN,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    RestoreError::InvalidKey.to_string(),
                )
                    .into_response();
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => {
                error!(message = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<RestoreError> for AppError {
    fn from(err: RestoreError) -> Self {
        match err {
            RestoreError::InvalidKey => Self::InvalidRestoreKey,
            RestoreError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Internal(err.to_string())
    }
}

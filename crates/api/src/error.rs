use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use waitline_core::error::CoreError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `waitline_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::QueueNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Queue {id} not found"),
                ),
                CoreError::EntryNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("Entry {id} not found"),
                ),
                // Uniform body for unknown, forged, and expired tokens alike.
                CoreError::SessionNotFound => (
                    StatusCode::NOT_FOUND,
                    "SESSION_NOT_FOUND",
                    "Not in any queue".to_string(),
                ),
                CoreError::QueueClosed => (
                    StatusCode::CONFLICT,
                    "QUEUE_CLOSED",
                    "Queue is closed".to_string(),
                ),
                CoreError::QueueFull => (
                    StatusCode::CONFLICT,
                    "QUEUE_FULL",
                    "Queue is full".to_string(),
                ),
                CoreError::DuplicateEntry => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_ENTRY",
                    "An active entry already exists for this contact".to_string(),
                ),
                CoreError::InvalidTransition(msg) => (
                    StatusCode::CONFLICT,
                    "INVALID_TRANSITION",
                    format!("Invalid transition: {msg}"),
                ),
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::ConfirmationRequired => (
                    StatusCode::BAD_REQUEST,
                    "CONFIRMATION_REQUIRED",
                    "Explicit confirmation required".to_string(),
                ),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

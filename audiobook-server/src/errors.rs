//! HTTP error boundary: turns [`CoreError`]/[`ConfigError`] into the
//! `{ data?, error? }` response shape with a machine code (§7), grounded on
//! the teacher's `AppError`/`AppResult` pair in `ferrex-server/src/errors.rs`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use audiobook_core::CoreError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), retry_after_secs: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        } else {
            tracing::info!(code = self.code, message = %self.message, "request rejected");
        }
        let body = json!({ "error": { "code": self.code, "message": self.message } });
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Maps a core error onto the HTTP status/code table in §7.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match err {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::Storage(_) | CoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Provider { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::Canceled => StatusCode::CONFLICT,
            CoreError::Blocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Template(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::RateLimited { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::LockHeld(_) => StatusCode::CONFLICT,
        };
        let retry_after_secs = match err {
            CoreError::RateLimited { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        };
        Self { status, code: err.code(), message: err.to_string(), retry_after_secs }
    }
}

impl From<audiobook_config::ConfigError> for ApiError {
    fn from(err: audiobook_config::ConfigError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION", err.to_string())
    }
}

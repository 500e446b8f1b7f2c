//! Crate-wide error type.
//!
//! Every fallible core operation returns [`Result<T>`]. Variants map
//! directly onto the error kinds described in the system design (`NotFound`,
//! `Conflict`, `Validation`, `StorageError`, `ProviderError`, `Canceled`,
//! `Blocked`, `TemplateError`, `RateLimited`) so the HTTP boundary can derive
//! a status code and machine-readable code without re-deriving semantics.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("operation canceled")]
    Canceled,

    #[error("blocked by do-not-import rule: {reason}")]
    Blocked { reason: String },

    #[error("template error: {0}")]
    Template(String),

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("lock held on path {0}")]
    LockHeld(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Stable machine code surfaced at the HTTP boundary (§7 of the design).
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Validation(_) => "VALIDATION",
            CoreError::Storage(_) => "STORAGE_ERROR",
            CoreError::Provider { .. } => "PROVIDER_ERROR",
            CoreError::Canceled => "CANCELED",
            CoreError::Blocked { .. } => "BLOCKED",
            CoreError::Template(_) => "TEMPLATE_ERROR",
            CoreError::RateLimited { .. } => "RATE_LIMITED",
            CoreError::LockHeld(_) => "STORAGE_ERROR",
            CoreError::Io(_) => "STORAGE_ERROR",
        }
    }
}

impl From<sled::Error> for CoreError {
    fn from(e: sled::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

#[cfg(feature = "relational-store")]
impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CoreError::NotFound("row not found".into()),
            other => CoreError::Storage(other.to_string()),
        }
    }
}

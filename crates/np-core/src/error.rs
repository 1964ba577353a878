//! # AppError
//!
//! Centralized error handling for the portal.
//! Maps storage and request failures to actionable error types.

use thiserror::Error;

/// The primary error type for all np-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Record not found (kind, id)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., missing title, bad date, unknown field)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing or rejected bearer token
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Record already exists (e.g., client-supplied duplicate id)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backing JSON document could not be parsed.
    #[error("corrupt store {path}: {reason}")]
    CorruptStore { path: String, reason: String },

    /// Writing an uploaded asset to disk failed.
    #[error("asset write failed for {path}: {source}")]
    AssetIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Filesystem failure on the record store itself
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else (e.g., a joined task panicked)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::ValidationError(message.into())
    }

    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }

    /// True for errors the caller caused and can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(..)
                | AppError::ValidationError(_)
                | AppError::Unauthorized(_)
                | AppError::Conflict(_)
        )
    }
}

/// A specialized Result type for portal logic.
pub type Result<T> = std::result::Result<T, AppError>;

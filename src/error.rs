//! Error types for feedstore
//!
//! Only conditions the caller has to act on become an `AppError`.
//! Business-rule rejections and missing targets are reported as
//! [`crate::service::Outcome`] values instead.

use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input outside of feed mutations (e.g. profile edits)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend unavailable or refused the operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Write would exceed the configured storage quota
    #[error("Storage quota exceeded: {required} bytes required, {quota} bytes available")]
    QuotaExceeded { required: usize, quota: usize },

    /// Snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error from the file-backed storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used for the error metric
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Storage(_) => "storage",
            AppError::QuotaExceeded { .. } => "quota_exceeded",
            AppError::Serialization(_) => "serialization",
            AppError::Io(_) => "io",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_mentions_sizes() {
        let error = AppError::QuotaExceeded {
            required: 6_000,
            quota: 5_000,
        };
        let message = error.to_string();
        assert!(message.contains("6000"));
        assert!(message.contains("5000"));
        assert_eq!(error.kind(), "quota_exceeded");
    }
}

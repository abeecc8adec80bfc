//! Storage error types.

use thiserror::Error;

use rgate_models::{ApiErrorBody, ErrorCode};

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage: {0}")]
    ConfigError(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid file reference: {0}")]
    InvalidKey(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    /// A bad reference from the caller is an input problem; everything else is ours.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::NotFound(_) | StorageError::InvalidKey(_) => ErrorCode::InputError,
            _ => ErrorCode::StorageError,
        }
    }

    pub fn to_body(&self) -> ApiErrorBody {
        ApiErrorBody::new(self.code(), self.to_string())
    }
}

//! Worker error types.

use thiserror::Error;

use rgate_media::MediaError;
use rgate_models::{ApiErrorBody, ErrorCode, ModelError};
use rgate_queue::QueueError;
use rgate_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Source not found: {0}")]
    SourceMissing(String),

    #[error("Unsupported source reference: {0}")]
    UnsupportedSource(String),

    #[error("Source download rejected credentials ({status}): {url}")]
    Unauthorized { url: String, status: u16 },

    #[error("Source download failed: {message}")]
    Network {
        url: String,
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn network(url: impl Into<String>, message: impl Into<String>, status: Option<u16>, transient: bool) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            status,
            transient,
        }
    }

    /// Classify a failed HTTP response.
    pub fn from_status(url: &str, status: reqwest::StatusCode) -> Self {
        let code = status.as_u16();
        if code == 401 || code == 403 {
            return Self::Unauthorized {
                url: url.to_string(),
                status: code,
            };
        }
        let transient = status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT;
        Self::network(url, format!("HTTP {}", code), Some(code), transient)
    }

    /// Classify a transport failure.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(url, status);
        }
        let transient = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
        Self::network(url, err.to_string(), None, transient)
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Network { transient: true, .. })
    }

    /// Wire error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            WorkerError::SourceMissing(_) | WorkerError::UnsupportedSource(_) => ErrorCode::InputError,
            WorkerError::Unauthorized { .. } => ErrorCode::AuthError,
            WorkerError::Network { .. } => ErrorCode::NetworkError,
            WorkerError::Model(e) => e.code(),
            WorkerError::Media(e) => e.code(),
            WorkerError::Storage(_) | WorkerError::Io(_) => ErrorCode::StorageError,
            WorkerError::Queue(e) => e.code(),
        }
    }

    /// Convert into the wire error shape.
    pub fn to_body(&self) -> ApiErrorBody {
        match self {
            WorkerError::Model(e) => e.to_body(),
            WorkerError::Media(e) => e.to_body(),
            WorkerError::Storage(e) => e.to_body(),
            WorkerError::Unauthorized { url, status } => {
                ApiErrorBody::new(ErrorCode::AuthError, "Source host refused the request; check the URL's credentials")
                    .with_details(serde_json::json!({ "url": url, "status": status }))
            }
            WorkerError::Network {
                url,
                message,
                status,
                transient,
            } => ApiErrorBody::new(ErrorCode::NetworkError, format!("Could not download source: {}", message))
                .with_details(serde_json::json!({ "url": url, "status": status, "transient": transient })),
            other => ApiErrorBody::new(other.code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        let auth = WorkerError::from_status("u", StatusCode::FORBIDDEN);
        assert_eq!(auth.code(), ErrorCode::AuthError);
        assert!(!auth.is_retryable());

        let unavailable = WorkerError::from_status("u", StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.code(), ErrorCode::NetworkError);
        assert!(unavailable.is_retryable());

        let limited = WorkerError::from_status("u", StatusCode::TOO_MANY_REQUESTS);
        assert!(limited.is_retryable());

        let missing = WorkerError::from_status("u", StatusCode::NOT_FOUND);
        assert_eq!(missing.code(), ErrorCode::NetworkError);
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_media_errors_keep_their_category() {
        let err = WorkerError::from(MediaError::Timeout(30));
        assert_eq!(err.code(), ErrorCode::FfmpegError);
        assert_eq!(err.to_body().details.unwrap()["reason"], "timeout");

        let err = WorkerError::SourceMissing("/uploads/x.mp4".to_string());
        assert_eq!(err.code(), ErrorCode::InputError);
    }
}

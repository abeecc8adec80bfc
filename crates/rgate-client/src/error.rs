//! Client error types.

use std::time::Duration;

use thiserror::Error;

use rgate_models::{ApiErrorBody, ErrorCode, JobId};

pub type ClientResult<T> = Result<T, ClientError>;

/// Characters of a non-JSON body kept for diagnosis.
pub const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with something other than JSON, usually a
    /// misrouted proxy or a static HTML page.
    #[error("Expected application/json but got {content_type:?} (HTTP {status}): {preview}")]
    InvalidContentType {
        status: u16,
        content_type: String,
        preview: String,
    },

    #[error("Malformed JSON response (HTTP {status}): {message}")]
    InvalidJson { status: u16, message: String },

    /// The gateway reported a structured failure.
    #[error("Gateway error (HTTP {status}): {error}")]
    Api { status: u16, error: ApiErrorBody },

    /// Transport failure or a non-2xx without an error envelope.
    #[error("HTTP error{}: {message}", .status.map(|s| format!(" {}", s)).unwrap_or_default())]
    Http { status: Option<u16>, message: String },

    #[error("Job {job_id} did not finish within {waited:?}")]
    Timeout { job_id: JobId, waited: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn http(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Wire category of this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::InvalidContentType { .. } => ErrorCode::InvalidContentType,
            ClientError::InvalidJson { .. } => ErrorCode::InvalidJson,
            ClientError::Api { error, .. } => error.code,
            ClientError::Http { .. } | ClientError::Timeout { .. } => ErrorCode::HttpError,
            ClientError::Io(_) => ErrorCode::InputError,
        }
    }

    pub fn to_body(&self) -> ApiErrorBody {
        match self {
            ClientError::Api { error, .. } => error.clone(),
            other => ApiErrorBody::new(other.code(), other.to_string()),
        }
    }

    /// HTTP status of the response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::InvalidContentType { status, .. }
            | ClientError::InvalidJson { status, .. }
            | ClientError::Api { status, .. } => Some(*status),
            ClientError::Http { status, .. } => *status,
            _ => None,
        }
    }

    /// Transport failures and gateway overload are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http { status: None, .. } => true,
            ClientError::Http { status: Some(s), .. } | ClientError::Api { status: s, .. } => {
                matches!(s, 429 | 502 | 503 | 504)
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::http(e.status().map(|s| s.as_u16()), e.to_string())
    }
}

/// First characters of a body, on one line.
pub fn preview(body: &str) -> String {
    let flat: String = body
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    flat.trim().to_string()
}

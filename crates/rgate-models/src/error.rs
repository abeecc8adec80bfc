//! Error taxonomy shared by every layer of the gateway.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobStatus;
use crate::validation::PlanIssue;

pub type ModelResult<T> = Result<T, ModelError>;

/// Wire-level error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InputError,
    PlanError,
    NetworkError,
    FfmpegError,
    StorageError,
    AuthError,
    HttpError,
    InvalidContentType,
    InvalidJson,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InputError => "INPUT_ERROR",
            ErrorCode::PlanError => "PLAN_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::FfmpegError => "FFMPEG_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::HttpError => "HTTP_ERROR",
            ErrorCode::InvalidContentType => "INVALID_CONTENT_TYPE",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Only transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorCode::NetworkError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error returned to callers.
///
/// `message` is meant for humans; raw process output only ever appears
/// under `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApiErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Errors raised by model-level operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Invalid plan: {} issue(s)", .0.len())]
    InvalidPlan(Vec<PlanIssue>),

    #[error("Illegal job transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

impl ModelError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::InvalidInput(_) => ErrorCode::InputError,
            ModelError::InvalidPlan(_) => ErrorCode::PlanError,
            ModelError::InvalidTransition { .. } => ErrorCode::InternalError,
        }
    }

    /// Convert into the wire error shape.
    pub fn to_body(&self) -> ApiErrorBody {
        match self {
            ModelError::InvalidPlan(issues) => {
                let summary = issues
                    .first()
                    .map(|i| format!("{}: {}", i.path, i.message))
                    .unwrap_or_default();
                ApiErrorBody::new(
                    ErrorCode::PlanError,
                    format!("Execution plan is not renderable ({})", summary),
                )
                .with_details(serde_json::json!({ "issues": issues }))
            }
            other => ApiErrorBody::new(other.code(), other.to_string()),
        }
    }
}

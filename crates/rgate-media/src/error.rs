//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use rgate_models::{ApiErrorBody, EngineId, ErrorCode};

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while compiling, probing or running FFmpeg.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr_tail: Vec<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Engine {0} has no command compiler")]
    UnsupportedEngine(EngineId),

    #[error("Plan cannot be compiled: {0}")]
    InvalidPlan(String),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(message: impl Into<String>, stderr_tail: Vec<String>, exit_code: Option<i32>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr_tail,
            exit_code,
        }
    }

    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan(message.into())
    }

    /// Wire error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            MediaError::FileNotFound(_) | MediaError::InvalidVideo(_) => ErrorCode::InputError,
            MediaError::InvalidPlan(_) | MediaError::UnsupportedEngine(_) => ErrorCode::PlanError,
            _ => ErrorCode::FfmpegError,
        }
    }

    /// Convert into the wire error shape. Process output goes to `details` only.
    pub fn to_body(&self) -> ApiErrorBody {
        match self {
            MediaError::FfmpegFailed {
                stderr_tail, exit_code, ..
            } => ApiErrorBody::new(ErrorCode::FfmpegError, "Rendering failed while encoding the output").with_details(
                serde_json::json!({
                    "exitCode": exit_code,
                    "stderrTail": stderr_tail,
                }),
            ),
            MediaError::Timeout(secs) => {
                ApiErrorBody::new(ErrorCode::FfmpegError, format!("Rendering exceeded the {}s time limit", secs))
                    .with_details(serde_json::json!({ "reason": "timeout", "timeoutSecs": secs }))
            }
            MediaError::Cancelled => ApiErrorBody::new(ErrorCode::FfmpegError, "Rendering was cancelled")
                .with_details(serde_json::json!({ "reason": "cancelled" })),
            MediaError::FfprobeFailed { stderr, .. } => {
                let body = ApiErrorBody::new(ErrorCode::InputError, "Source media could not be inspected");
                match stderr {
                    Some(stderr) => body.with_details(serde_json::json!({ "stderrTail": stderr })),
                    None => body,
                }
            }
            other => ApiErrorBody::new(other.code(), other.to_string()),
        }
    }
}

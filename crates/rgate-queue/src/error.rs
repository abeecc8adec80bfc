//! Queue error types.

use thiserror::Error;

use rgate_models::{ApiErrorBody, ErrorCode, JobId, ModelError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue is not running")]
    ActorGone,

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("A job is already running: {0}")]
    Busy(JobId),

    #[error(transparent)]
    Transition(#[from] ModelError),
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            QueueError::JobNotFound(_) => ErrorCode::NotFound,
            _ => ErrorCode::InternalError,
        }
    }

    pub fn to_body(&self) -> ApiErrorBody {
        ApiErrorBody::new(self.code(), self.to_string())
    }
}

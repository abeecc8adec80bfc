//! Failure classification and recovery decisions.
//!
//! Every failure the worker sees goes through [`ErrorHandler::handle`], which
//! settles its category from the pipeline stage, decides between retrying and
//! aborting, and appends the decision to the error-record store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use rgate_models::{ApiErrorBody, ErrorCode, JobId};
use rgate_storage::{ErrorDecision, ErrorRecord, ErrorRecordStore, ErrorStage};

use crate::error::WorkerError;
use crate::retry::RetryPolicy;

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone)]
pub struct ErrorContext<'a> {
    pub job_id: &'a JobId,
    pub project_id: Option<&'a str>,
    pub stage: ErrorStage,
    /// 1-based attempt number of the failing operation
    pub attempt: u32,
}

/// What the worker should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { delay: Duration },
    Abort,
}

/// Outcome of handling one failure.
#[derive(Debug, Clone)]
pub struct Handled {
    pub record: ErrorRecord,
    pub decision: Decision,
}

impl Handled {
    /// Error to surface on the job.
    pub fn body(&self) -> ApiErrorBody {
        self.record.to_body()
    }
}

/// Category a stage produces when the error itself carries none.
pub fn stage_code(stage: ErrorStage) -> ErrorCode {
    match stage {
        ErrorStage::Validation => ErrorCode::InputError,
        ErrorStage::Plan => ErrorCode::PlanError,
        ErrorStage::Auth => ErrorCode::AuthError,
        ErrorStage::Fetch => ErrorCode::NetworkError,
        ErrorStage::Encode => ErrorCode::FfmpegError,
        ErrorStage::Store => ErrorCode::StorageError,
    }
}

/// Settle the wire error and effective stage for a failure.
///
/// Errors that already name a specific category keep it; generic failures
/// take their stage's category. Credential failures are attributed to the
/// auth stage wherever they surface.
pub fn classify(error: &WorkerError, stage: ErrorStage) -> (ApiErrorBody, ErrorStage) {
    let mut body = error.to_body();
    if body.code == ErrorCode::InternalError {
        body.code = stage_code(stage);
    }
    let stage = if body.code == ErrorCode::AuthError {
        ErrorStage::Auth
    } else {
        stage
    };
    (body, stage)
}

/// Classifies failures, decides retry vs abort, and persists the decision.
#[derive(Clone)]
pub struct ErrorHandler {
    store: Arc<dyn ErrorRecordStore>,
    policy: RetryPolicy,
}

impl ErrorHandler {
    pub fn new(store: Arc<dyn ErrorRecordStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Only transient network failures are retried, up to the attempt ceiling.
    pub fn decide(&self, error: &WorkerError, code: ErrorCode, attempt: u32) -> Decision {
        if !code.is_transient() || !error.is_retryable() {
            return Decision::Abort;
        }
        match self.policy.backoff(attempt) {
            Some(delay) => Decision::Retry { delay },
            None => Decision::Abort,
        }
    }

    /// Classify, decide and record one failure.
    ///
    /// A failure to persist the record is logged; it never changes the decision.
    pub async fn handle(&self, error: &WorkerError, ctx: ErrorContext<'_>) -> Handled {
        let (body, stage) = classify(error, ctx.stage);
        let decision = self.decide(error, body.code, ctx.attempt);

        let record_decision = match decision {
            Decision::Retry { .. } => ErrorDecision::Retry,
            Decision::Abort => ErrorDecision::Abort,
        };
        let mut record = ErrorRecord::new(ctx.job_id.clone(), stage, &body, ctx.attempt, record_decision)
            .with_project(ctx.project_id.map(str::to_string));
        if let Decision::Retry { delay } = decision {
            record = record.with_retry_delay(delay.as_millis() as u64);
        }

        match decision {
            Decision::Retry { delay } => warn!(
                job_id = %ctx.job_id,
                stage = %stage,
                code = %body.code,
                attempt = ctx.attempt,
                "Retrying in {:?}: {}", delay, body.message
            ),
            Decision::Abort => error!(
                job_id = %ctx.job_id,
                stage = %stage,
                code = %body.code,
                attempt = ctx.attempt,
                "Aborting job: {}", error
            ),
        }
        metrics::counter!(
            "rgate_job_errors_total",
            "code" => body.code.as_str(),
            "stage" => stage.as_str()
        )
        .increment(1);

        if let Err(e) = self.store.append(&record).await {
            error!(job_id = %ctx.job_id, "Failed to persist error record: {}", e);
        }

        Handled { record, decision }
    }
}

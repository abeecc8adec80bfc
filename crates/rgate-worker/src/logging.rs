//! Structured render logging.
//!
//! Every line about a render carries `job_id` and `plan_id`, so one job can
//! be followed through the logs with a single filter.

use std::fmt::Display;
use std::time::Duration;

use tracing::{error, info, warn, Span};

use rgate_models::{Job, JobStatus, RoutingDecision};

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    plan_id: String,
}

impl JobLogger {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            plan_id: job.plan_id.clone(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Span covering one render. `engine` is recorded once routing settles.
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "render",
            job_id = %self.job_id,
            plan_id = %self.plan_id,
            engine = tracing::field::Empty,
        )
    }

    pub fn claimed(&self) {
        info!(job_id = %self.job_id, plan_id = %self.plan_id, "Render started");
    }

    pub fn routed(&self, decision: &RoutingDecision) {
        let rejected: Vec<&str> = decision.fallback_chain.iter().map(|r| r.engine.as_str()).collect();
        info!(
            job_id = %self.job_id,
            engine = %decision.selected,
            required = decision.required.len(),
            rejected = ?rejected,
            "Plan routed"
        );
    }

    pub fn encoding(&self, inputs: usize, timeout: Duration) {
        info!(
            job_id = %self.job_id,
            inputs,
            timeout_secs = timeout.as_secs(),
            "Encoding"
        );
    }

    pub fn encoded(&self, elapsed: Duration) {
        info!(
            job_id = %self.job_id,
            elapsed_secs = elapsed.as_secs_f64(),
            "Encode finished"
        );
    }

    pub fn exported(&self) {
        warn!(job_id = %self.job_id, "No renderer available, exporting compiled plan");
    }

    pub fn finished(&self, job: &Job) {
        match (job.status, &job.error) {
            (JobStatus::Error, Some(err)) => warn!(
                job_id = %self.job_id,
                status = %job.status,
                code = %err.code,
                "Render failed: {}", err.message
            ),
            _ => info!(job_id = %self.job_id, status = %job.status, "Render resolved"),
        }
    }

    pub fn cleanup_failed(&self, err: impl Display) {
        warn!(job_id = %self.job_id, "Failed to clean work dir: {}", err);
    }

    pub fn record_failed(&self, err: impl Display) {
        error!(job_id = %self.job_id, "Failed to record outcome: {}", err);
    }
}

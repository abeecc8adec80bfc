//! Render job records and their lifecycle.
//!
//! A job moves `queued -> running -> {done | error | partial_success}`.
//! Every mutation goes through a method that checks the transition, so a
//! terminal record can never be overwritten.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::engine::{EngineId, EngineRejection, RoutingDecision};
use crate::error::{ApiErrorBody, ModelError, ModelResult};
use crate::plan::ExecutionPlan;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for the worker
    #[default]
    Queued,
    /// The active render
    Running,
    /// Rendered; `output_url` is set
    Done,
    /// Failed; `error` is set
    Error,
    /// Nothing could render the plan; artifacts only
    PartialSuccess,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::PartialSuccess => "partial_success",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::PartialSuccess)
    }

    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running | JobStatus::Error) => true,
            (JobStatus::Running, JobStatus::Done | JobStatus::Error | JobStatus::PartialSuccess) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a `partial_success` job hands back instead of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobArtifacts {
    pub engine: EngineId,
    pub fallback_chain: Vec<EngineRejection>,
    pub command: String,
    pub args: Vec<String>,
    pub plan: ExecutionPlan,
}

/// A rendered file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub output_url: String,
    pub output_size: u64,
    pub duration_ms: u64,
}

/// One asynchronous render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "jobId")]
    pub id: JobId,
    pub plan_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub status: JobStatus,
    /// Jobs ahead of this one; 0 once running or finished.
    pub queue_position: usize,
    pub progress_pct: u8,
    #[serde(default)]
    pub logs_tail: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_chain: Vec<EngineRejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    /// Render wall-clock time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Box<JobArtifacts>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job for a plan.
    pub fn new(id: JobId, plan: &ExecutionPlan, queue_position: usize) -> Self {
        Self {
            id,
            plan_id: plan.plan_id.clone(),
            project_id: plan.project_id.clone(),
            status: JobStatus::Queued,
            queue_position,
            progress_pct: 0,
            logs_tail: Vec::new(),
            engine: None,
            fallback_chain: Vec::new(),
            output_url: None,
            output_size: None,
            duration_ms: None,
            error: None,
            artifacts: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn ensure_running(&self) -> ModelResult<()> {
        if self.status != JobStatus::Running {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: JobStatus::Running,
            });
        }
        Ok(())
    }

    /// Mark the job as the active render.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Running)?;
        self.queue_position = 0;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record the routing outcome.
    pub fn set_route(&mut self, decision: &RoutingDecision) -> ModelResult<()> {
        self.ensure_running()?;
        self.engine = Some(decision.selected);
        self.fallback_chain = decision.fallback_chain.clone();
        Ok(())
    }

    /// Update progress. Never moves backwards and stays below 100 until done.
    pub fn set_progress(&mut self, pct: u8) -> ModelResult<()> {
        self.ensure_running()?;
        self.progress_pct = self.progress_pct.max(pct.min(99));
        Ok(())
    }

    /// Append log lines, keeping only the last `cap`.
    pub fn push_logs(&mut self, lines: impl IntoIterator<Item = String>, cap: usize) -> ModelResult<()> {
        self.ensure_running()?;
        self.logs_tail.extend(lines);
        if self.logs_tail.len() > cap {
            let excess = self.logs_tail.len() - cap;
            self.logs_tail.drain(..excess);
        }
        Ok(())
    }

    /// Finish with a rendered file.
    pub fn complete(&mut self, output: RenderOutput) -> ModelResult<()> {
        self.transition(JobStatus::Done)?;
        self.progress_pct = 100;
        self.output_url = Some(output.output_url);
        self.output_size = Some(output.output_size);
        self.duration_ms = Some(output.duration_ms);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Finish with an error.
    pub fn fail(&mut self, error: ApiErrorBody) -> ModelResult<()> {
        self.transition(JobStatus::Error)?;
        self.queue_position = 0;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Finish without rendering, returning the compiled artifacts.
    pub fn partial(&mut self, artifacts: JobArtifacts) -> ModelResult<()> {
        self.transition(JobStatus::PartialSuccess)?;
        self.progress_pct = 100;
        self.engine = Some(artifacts.engine);
        self.fallback_chain = artifacts.fallback_chain.clone();
        self.artifacts = Some(Box::new(artifacts));
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

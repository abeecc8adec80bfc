//! Append-only error records.
//!
//! Every retry/abort decision the worker makes is written once and never
//! rewritten, so operators can reconstruct what happened to a job.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use rgate_models::{ApiErrorBody, ErrorCode, JobId};

use crate::error::StorageResult;

/// Pipeline stage a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Validation,
    Plan,
    Auth,
    Fetch,
    Encode,
    Store,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Validation => "validation",
            ErrorStage::Plan => "plan",
            ErrorStage::Auth => "auth",
            ErrorStage::Fetch => "fetch",
            ErrorStage::Encode => "encode",
            ErrorStage::Store => "store",
        }
    }
}

impl std::fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the worker did about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDecision {
    Retry,
    Abort,
}

/// One persisted failure decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub stage: ErrorStage,
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub attempt: u32,
    pub decision: ErrorDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(job_id: JobId, stage: ErrorStage, error: &ApiErrorBody, attempt: u32, decision: ErrorDecision) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            job_id,
            project_id: None,
            stage,
            code: error.code,
            message: error.message.clone(),
            details: error.details.clone(),
            attempt,
            decision,
            retry_delay_ms: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_retry_delay(mut self, delay_ms: u64) -> Self {
        self.retry_delay_ms = Some(delay_ms);
        self
    }

    pub fn to_body(&self) -> ApiErrorBody {
        ApiErrorBody {
            code: self.code,
            message: self.message.clone(),
            details: self.details.clone(),
        }
    }
}

/// Sink for error records.
#[async_trait]
pub trait ErrorRecordStore: Send + Sync {
    async fn append(&self, record: &ErrorRecord) -> StorageResult<()>;
}

/// JSON-lines file, one record per line.
pub struct JsonlErrorStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlErrorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ErrorRecordStore for JsonlErrorStore {
    async fn append(&self, record: &ErrorRecord) -> StorageResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryErrorStore {
    records: Mutex<Vec<ErrorRecord>>,
}

impl MemoryErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ErrorRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ErrorRecordStore for MemoryErrorStore {
    async fn append(&self, record: &ErrorRecord) -> StorageResult<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

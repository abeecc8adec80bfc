//! Wire types of the gateway API, as seen by callers.

use serde::{Deserialize, Serialize};

use rgate_models::{ExecutionPlan, JobId, JobStatus, TransformOptions};

/// FFmpeg availability reported by `/api/health`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FfmpegStatus {
    pub available: bool,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub ffmpeg: FfmpegStatus,
    pub outputs_dir: String,
    pub uploads_dir: String,
    pub queue_length: usize,
    #[serde(default)]
    pub current_job: Option<JobId>,
    pub uptime: u64,
    pub time: String,
}

/// A stored upload. `file_path` is the reference to render from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    pub file_path: String,
    pub public_url: String,
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
}

/// Acknowledgement of `execute` / `execute-plan`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: usize,
    pub status_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecuteBody<'a> {
    pub source_path: &'a str,
    #[serde(flatten)]
    pub options: &'a TransformOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecutePlanBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_video_url: Option<&'a str>,
    pub plan: &'a ExecutionPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<&'a str>,
}

//! Render submission handlers.
//!
//! Both endpoints only admit work: the response carries the job id and its
//! queue position, and everything after that is visible through
//! `GET /api/jobs/:id`.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use rgate_media::probe_video;
use rgate_models::{ExecutionPlan, Job, JobId, JobStatus, SourceInfo, TransformOptions};
use rgate_queue::JobRequest;

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::metrics;
use crate::state::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `POST /api/execute`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "sourcePath is required"))]
    pub source_path: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub options: TransformOptions,
}

/// Body of `POST /api/execute-plan`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePlanRequest {
    #[serde(default)]
    pub source_video_url: Option<String>,
    pub plan: ExecutionPlan,
    #[serde(default)]
    pub output_name: Option<String>,
}

/// Acknowledgement for an admitted job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub ok: bool,
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: usize,
    pub status_url: String,
}

impl From<&Job> for JobAccepted {
    fn from(job: &Job) -> Self {
        Self {
            ok: true,
            job_id: job.id.clone(),
            status: job.status,
            queue_position: job.queue_position,
            status_url: status_url(&job.id),
        }
    }
}

pub fn status_url(id: &JobId) -> String {
    format!("/api/jobs/{}", id)
}

/// Queue a simple transform of one source.
pub async fn execute(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ExecuteRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let source_path = request.source_path.trim();
    let source = inspect_source(&state, source_path, &request.options).await?;
    let plan = request.options.into_plan(source_path, &source)?;

    let job = state.queue.submit(JobRequest::new(plan)).await?;
    info!(job_id = %job.id, position = job.queue_position, "Queued transform of {}", source_path);
    metrics::record_job_submitted("execute");

    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}

/// Queue a full execution plan.
///
/// Plans are admitted as-is; validation failures surface on the job as
/// `PLAN_ERROR`.
pub async fn execute_plan(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ExecutePlanRequest>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let mut plan = request.plan;
    if let Some(url) = request.source_video_url.map(|u| u.trim().to_string()) {
        if !url.is_empty() {
            plan.source_video_url = Some(url);
        }
    }

    let output_name = request.output_name.filter(|n| !n.trim().is_empty());
    let plan_id = plan.plan_id.clone();
    let job = state
        .queue
        .submit(JobRequest::new(plan).with_output_name(output_name))
        .await?;
    info!(job_id = %job.id, plan_id = %plan_id, position = job.queue_position, "Queued execution plan");
    metrics::record_job_submitted("execute_plan");

    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}

/// What is known about the source before planning.
///
/// Upload references must exist. ffprobe runs unless the request already
/// fixes the duration and frame size and mutes audio. A probe failure leaves
/// those unknown, and unknown audio is rendered as silence.
async fn inspect_source(state: &AppState, source_path: &str, options: &TransformOptions) -> ApiResult<SourceInfo> {
    let local = state.uploads.resolve_reference(source_path);
    if let Some(path) = &local {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ApiError::bad_request(format!("Source not found: {}", source_path)));
        }
    }

    if !options.needs_probe() {
        return Ok(SourceInfo::default());
    }

    let target = local
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| source_path.to_string());
    match tokio::time::timeout(PROBE_TIMEOUT, probe_video(&target)).await {
        Ok(Ok(info)) => Ok(info.to_source_info()),
        Ok(Err(e)) => {
            warn!("Could not probe {}: {}", source_path, e);
            Ok(SourceInfo::default())
        }
        Err(_) => {
            warn!("Probing {} timed out after {:?}", source_path, PROBE_TIMEOUT);
            Ok(SourceInfo::default())
        }
    }
}

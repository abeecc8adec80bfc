//! Job status and plan schema handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use rgate_models::{plan_json_schema, Job, JobId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `{ok:true, ...job}`.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub job: Job,
}

/// Poll a job.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<JobResponse>> {
    let id = JobId::from_string(job_id);
    let job = state
        .queue
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("Job not found: {}", id)))?;
    Ok(Json(JobResponse { ok: true, job }))
}

/// Plan schema response.
#[derive(Debug, Serialize)]
pub struct PlanSchemaResponse {
    pub ok: bool,
    pub schema: serde_json::Value,
}

/// JSON Schema of the execution plan accepted by `POST /api/execute-plan`.
pub async fn plan_schema() -> ApiResult<Json<PlanSchemaResponse>> {
    let schema = serde_json::to_value(plan_json_schema())
        .map_err(|e| ApiError::internal(format!("Failed to render plan schema: {}", e)))?;
    Ok(Json(PlanSchemaResponse { ok: true, schema }))
}

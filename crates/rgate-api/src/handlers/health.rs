//! Health check handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use rgate_media::FfmpegInfo;
use rgate_models::JobId;

use crate::state::AppState;

/// Health response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub ffmpeg: FfmpegInfo,
    pub outputs_dir: String,
    pub uploads_dir: String,
    pub queue_length: usize,
    pub current_job: Option<JobId>,
    /// Seconds since startup
    pub uptime: u64,
    pub time: String,
}

/// Liveness plus a cheap view of the queue.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.queue.snapshot();
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        ffmpeg: state.ffmpeg.as_ref().clone(),
        outputs_dir: state.outputs.dir().display().to_string(),
        uploads_dir: state.uploads.dir().display().to_string(),
        queue_length: snapshot.queue_length(),
        current_job: snapshot.current_job().cloned(),
        uptime: state.started_at.elapsed().as_secs(),
        time: Utc::now().to_rfc3339(),
    })
}

//! Application state.

use std::sync::Arc;
use std::time::Instant;

use rgate_media::FfmpegInfo;
use rgate_queue::QueueHandle;
use rgate_storage::{LocalStore, StorageConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub queue: QueueHandle,
    pub uploads: LocalStore,
    pub outputs: LocalStore,
    /// FFmpeg as detected at startup
    pub ffmpeg: Arc<FfmpegInfo>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ApiConfig, queue: QueueHandle, storage: &StorageConfig, ffmpeg: FfmpegInfo) -> Self {
        Self {
            config,
            queue,
            uploads: LocalStore::uploads(storage),
            outputs: LocalStore::outputs(storage),
            ffmpeg: Arc::new(ffmpeg),
            started_at: Instant::now(),
        }
    }
}

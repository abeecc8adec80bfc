//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use rgate_models::{EngineId, Quality};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scratch directory; each job gets its own subdirectory
    pub work_dir: PathBuf,
    /// Engines in priority order
    pub engines: Vec<EngineId>,
    /// Explicit ffmpeg binary, otherwise PATH
    pub ffmpeg_path: Option<PathBuf>,
    /// Render timeout as a multiple of the output duration
    pub render_timeout_factor: f64,
    pub render_timeout_min: Duration,
    pub render_timeout_max: Duration,
    /// Retries after the first failed fetch
    pub fetch_max_retries: u32,
    pub fetch_retry_base: Duration,
    /// Per-request download timeout
    pub fetch_timeout: Duration,
    /// Non-progress lines kept in `logsTail`
    pub logs_tail_lines: usize,
    /// Used when the plan does not name a quality
    pub default_quality: Quality,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("rgate"),
            engines: vec![EngineId::ServerFfmpeg, EngineId::PlanExport],
            ffmpeg_path: None,
            render_timeout_factor: 10.0,
            render_timeout_min: Duration::from_secs(120),
            render_timeout_max: Duration::from_secs(7200),
            fetch_max_retries: 3,
            fetch_retry_base: Duration::from_millis(500),
            fetch_timeout: Duration::from_secs(120),
            logs_tail_lines: 40,
            default_quality: Quality::Medium,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            engines: std::env::var("RENDER_ENGINES")
                .ok()
                .map(|s| parse_engines(&s))
                .filter(|engines| !engines.is_empty())
                .unwrap_or(defaults.engines),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            render_timeout_factor: std::env::var("RENDER_TIMEOUT_FACTOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|f: &f64| *f > 0.0)
                .unwrap_or(defaults.render_timeout_factor),
            render_timeout_min: Duration::from_secs(
                std::env::var("RENDER_TIMEOUT_MIN_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            render_timeout_max: Duration::from_secs(
                std::env::var("RENDER_TIMEOUT_MAX_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(7200),
            ),
            fetch_max_retries: std::env::var("FETCH_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fetch_max_retries),
            fetch_retry_base: Duration::from_millis(
                std::env::var("FETCH_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            fetch_timeout: Duration::from_secs(
                std::env::var("FETCH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            logs_tail_lines: std::env::var("LOGS_TAIL_LINES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.logs_tail_lines),
            default_quality: std::env::var("DEFAULT_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_quality),
        }
    }

    /// Wall-clock ceiling for a render of `output_duration_ms`.
    pub fn render_timeout(&self, output_duration_ms: i64) -> Duration {
        let secs = (output_duration_ms.max(0) as f64 / 1000.0) * self.render_timeout_factor;
        let scaled = Duration::from_secs_f64(secs);
        let max = self.render_timeout_max.max(self.render_timeout_min);
        scaled.clamp(self.render_timeout_min, max)
    }

    /// Engines this process can actually execute.
    ///
    /// Engines without a server-side executor are dropped, as is
    /// `server_ffmpeg` when no ffmpeg binary was found.
    pub fn usable_engines(&self, ffmpeg_available: bool) -> Vec<EngineId> {
        let mut usable = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            if !engine.has_server_executor() {
                warn!(engine = %engine, "Engine has no server-side executor, skipping");
                continue;
            }
            if *engine == EngineId::ServerFfmpeg && !ffmpeg_available {
                warn!("FFmpeg not available, server_ffmpeg disabled; plans will be exported");
                continue;
            }
            if !usable.contains(engine) {
                usable.push(*engine);
            }
        }
        usable
    }
}

/// Parse a comma list of engine ids, ignoring unknown entries.
pub fn parse_engines(list: &str) -> Vec<EngineId> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| match s.parse::<EngineId>() {
            Ok(engine) => Some(engine),
            Err(e) => {
                warn!("Ignoring RENDER_ENGINES entry: {}", e);
                None
            }
        })
        .collect()
}

//! Render gateway server binary.
//!
//! Runs the HTTP API, the job queue actor and the single render worker in
//! one process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rgate_api::{create_router, metrics, ApiConfig, AppState};
use rgate_media::{detect_ffmpeg, FfmpegRunner, FFMPEG_PROGRAM};
use rgate_queue::{JobQueue, QueueConfig};
use rgate_storage::{JsonlErrorStore, LocalStore, StorageConfig};
use rgate_worker::{ErrorHandler, ExecutorDeps, JobExecutor, RetryPolicy, SourceFetcher, WorkerConfig};

/// Time the worker gets to kill its render and record the outcome.
const WORKER_STOP_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting rgate-api");

    let config = ApiConfig::from_env();
    let storage = StorageConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let uploads = LocalStore::uploads(&storage);
    let outputs = LocalStore::outputs(&storage);
    uploads.ensure_dir().await.context("uploads directory")?;
    outputs.ensure_dir().await.context("outputs directory")?;

    let ffmpeg = detect_ffmpeg(worker_config.ffmpeg_path.as_deref()).await;
    if ffmpeg.available {
        info!(path = ?ffmpeg.path, version = ?ffmpeg.version, "FFmpeg detected");
    } else {
        warn!("FFmpeg not found; server-side rendering is unavailable");
    }

    let engines = worker_config.usable_engines(ffmpeg.available);
    let (queue, queue_task) = JobQueue::spawn(queue_config);

    let binary = ffmpeg.path.clone().unwrap_or_else(|| FFMPEG_PROGRAM.to_string());
    let retry = RetryPolicy::from_config(&worker_config);
    let deps = ExecutorDeps {
        queue: queue.clone(),
        runner: Arc::new(FfmpegRunner::new(binary)),
        fetcher: SourceFetcher::new(vec![uploads.clone(), outputs.clone()], worker_config.fetch_timeout)
            .context("source fetcher")?,
        outputs,
        errors: ErrorHandler::new(Arc::new(JsonlErrorStore::new(&storage.error_log_path)), retry),
        engines,
    };
    let executor = Arc::new(JobExecutor::new(worker_config, deps));
    let worker = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            if let Err(e) = executor.run().await {
                error!("Job executor failed: {}", e);
            }
        })
    };

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("metrics recorder")?)
    } else {
        None
    };

    let state = AppState::new(config.clone(), queue, &storage, ffmpeg);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    executor.shutdown();
    if tokio::time::timeout(WORKER_STOP_GRACE, worker).await.is_err() {
        warn!("Job executor did not stop within {:?}", WORKER_STOP_GRACE);
    }
    drop(executor);
    queue_task.abort();

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("rgate=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

//! Process execution for compiled commands.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::CompiledCommand;
use crate::error::{MediaError, MediaResult};
use crate::progress::{FfmpegProgress, LineKind, ProgressParser};

const READER_GRACE: Duration = Duration::from_secs(5);

/// Something observed while a command runs.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Progress(FfmpegProgress),
    Log(String),
}

/// Callback type for run events.
pub type EventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Limits applied to a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Wall-clock ceiling; the child is killed when it elapses.
    pub timeout: Option<Duration>,
    /// Flipping this to `true` kills the child.
    pub cancel: Option<watch::Receiver<bool>>,
    /// How many diagnostic lines to keep for error reports.
    pub tail_lines: usize,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub elapsed: Duration,
    pub stderr_tail: Vec<String>,
}

/// Executes compiled commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, command: &CompiledCommand, options: RunOptions, events: EventSink) -> MediaResult<RunOutcome>;
}

/// Runner for FFmpeg commands with progress tracking, timeout and cancellation.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
}

impl FfmpegRunner {
    /// Runner using an explicit ffmpeg binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    /// Runner using ffmpeg from PATH.
    pub fn discover() -> MediaResult<Self> {
        Ok(Self::new(check_ffmpeg()?))
    }

    pub fn binary(&self) -> &PathBuf {
        &self.binary
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

async fn sleep_or_forever(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(t) => {
            tokio::time::sleep(t).await;
            t
        }
        None => std::future::pending().await,
    }
}

async fn cancelled(cancel: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = cancel else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone; nobody can cancel any more
            return std::future::pending().await;
        }
    }
}

#[async_trait]
impl CommandExecutor for FfmpegRunner {
    async fn run(&self, command: &CompiledCommand, options: RunOptions, events: EventSink) -> MediaResult<RunOutcome> {
        debug!(binary = %self.binary.display(), "Running FFmpeg: {}", command.command_line());
        let started = Instant::now();

        let mut child = Command::new(&self.binary)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MediaError::FfmpegNotFound,
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::Io(std::io::Error::other("stderr not captured")))?;

        let tail_cap = options.tail_lines.max(1);
        let sink = events.clone();
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::new();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_cap);

            while let Ok(Some(line)) = lines.next_line().await {
                match parser.feed(&line) {
                    LineKind::Progress(Some(progress)) => sink(RunEvent::Progress(progress)),
                    LineKind::Progress(None) => {}
                    LineKind::Log => {
                        let line = line.trim_end().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if tail.len() == tail_cap {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                        sink(RunEvent::Log(line));
                    }
                }
            }
            Vec::from(tail)
        });

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            limit = sleep_or_forever(options.timeout) => Waited::TimedOut(limit),
            _ = cancelled(options.cancel.clone()) => Waited::Cancelled,
        };

        if !matches!(waited, Waited::Exited(_)) {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill FFmpeg process");
            }
        }

        // Orphaned grandchildren can hold stderr open; don't wait on them forever
        let stderr_tail = match tokio::time::timeout(READER_GRACE, reader_handle).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        let elapsed = started.elapsed();
        metrics::histogram!("rgate_ffmpeg_run_seconds").record(elapsed.as_secs_f64());

        match waited {
            Waited::Exited(status) => {
                let status = status?;
                if status.success() {
                    Ok(RunOutcome { elapsed, stderr_tail })
                } else {
                    Err(MediaError::ffmpeg_failed(
                        format!("FFmpeg exited with status {}", status.code().map_or("signal".to_string(), |c| c.to_string())),
                        stderr_tail,
                        status.code(),
                    ))
                }
            }
            Waited::TimedOut(limit) => {
                warn!("FFmpeg timed out after {} seconds, killed process", limit.as_secs());
                Err(MediaError::Timeout(limit.as_secs()))
            }
            Waited::Cancelled => {
                info!("FFmpeg cancelled, killed process");
                Err(MediaError::Cancelled)
            }
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

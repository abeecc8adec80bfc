//! FFmpeg collaborator for the render gateway.
//!
//! This crate provides:
//! - Type-safe, multi-input FFmpeg command building
//! - The plan compiler (execution plan -> filter graph + arguments)
//! - Encoder presets per container, codec and quality
//! - Progress parsing from `-progress pipe:2`
//! - A process runner with timeout and cancellation behind [`CommandExecutor`]
//! - ffprobe inspection and ffmpeg discovery

pub mod command;
pub mod compiler;
pub mod encoding;
pub mod error;
pub mod filters;
pub mod probe;
pub mod progress;
pub mod runner;

pub use command::{CompiledCommand, FfmpegCommand, FFMPEG_PROGRAM};
pub use compiler::compile;
pub use encoding::EncodingConfig;
pub use error::{MediaError, MediaResult};
pub use probe::{detect_ffmpeg, probe_video, FfmpegInfo, VideoInfo};
pub use progress::{FfmpegProgress, LineKind, ProgressParser};
pub use runner::{
    check_ffmpeg, check_ffprobe, CommandExecutor, EventSink, FfmpegRunner, RunEvent, RunOptions, RunOutcome,
};

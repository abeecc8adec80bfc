//! FFprobe source inspection and FFmpeg discovery.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use rgate_models::SourceInfo;

use crate::error::{MediaError, MediaResult};
use crate::runner::{check_ffmpeg, check_ffprobe};

/// Source media information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in milliseconds, when the container reports one
    pub duration_ms: Option<i64>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Video codec
    pub codec: String,
    pub has_audio: bool,
    /// File size in bytes
    pub size: u64,
}

impl VideoInfo {
    pub fn to_source_info(&self) -> SourceInfo {
        SourceInfo {
            duration_ms: self.duration_ms,
            width: (self.width > 0).then_some(self.width),
            height: (self.height > 0).then_some(self.height),
            has_audio: Some(self.has_audio),
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a local file or URL.
pub async fn probe_video(source: &str) -> MediaResult<VideoInfo> {
    let is_remote = source.starts_with("http://") || source.starts_with("https://");
    if !is_remote && !Path::new(source).exists() {
        return Err(MediaError::FileNotFound(PathBuf::from(source)));
    }

    let ffprobe = check_ffprobe()?;

    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(source)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

    let duration_ms = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(|d| (d * 1000.0).round() as i64);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_ref()
        .or(video_stream.r_frame_rate.as_ref())
        .and_then(|r| parse_frame_rate(r))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration_ms,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
        size,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

/// FFmpeg availability as reported by health checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfmpegInfo {
    pub available: bool,
    pub path: Option<String>,
    pub version: Option<String>,
}

impl FfmpegInfo {
    pub fn unavailable() -> Self {
        Self {
            available: false,
            path: None,
            version: None,
        }
    }
}

/// Locate ffmpeg (explicit path first, then PATH) and read its version.
pub async fn detect_ffmpeg(override_path: Option<&Path>) -> FfmpegInfo {
    let binary = match override_path {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => match which::which(path) {
            Ok(found) => found,
            Err(_) => return FfmpegInfo::unavailable(),
        },
        None => match check_ffmpeg() {
            Ok(found) => found,
            Err(_) => return FfmpegInfo::unavailable(),
        },
    };

    let output = Command::new(&binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            let version = parse_version(&stdout);
            debug!(path = %binary.display(), ?version, "Detected FFmpeg");
            FfmpegInfo {
                available: true,
                path: Some(binary.to_string_lossy().to_string()),
                version,
            }
        }
        _ => FfmpegInfo::unavailable(),
    }
}

/// "ffmpeg version 6.1.1-3ubuntu5 Copyright ..." -> "6.1.1-3ubuntu5".
fn parse_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .next()?
        .strip_prefix("ffmpeg version ")?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Keys FFmpeg writes in `-progress` blocks.
const PROGRESS_KEYS: &[&str] = &[
    "frame",
    "fps",
    "bitrate",
    "total_size",
    "out_time_us",
    "out_time_ms",
    "out_time",
    "dup_frames",
    "drop_frames",
    "speed",
    "progress",
];

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage of `total_duration_ms`, clamped to [0, 99].
    ///
    /// 100 is reserved for a successful exit.
    pub fn percent(&self, total_duration_ms: i64) -> u8 {
        if total_duration_ms <= 0 || self.out_time_ms <= 0 {
            return 0;
        }
        let pct = (self.out_time_ms as f64 / total_duration_ms as f64) * 100.0;
        pct.floor().clamp(0.0, 99.0) as u8
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_duration_ms: i64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }

        let remaining_ms = total_duration_ms - self.out_time_ms;
        if remaining_ms <= 0 {
            return Some(0.0);
        }

        Some((remaining_ms as f64 / 1000.0) / self.speed)
    }
}

/// What a stderr line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Part of a progress block; carries the snapshot when the block closes.
    Progress(Option<FfmpegProgress>),
    /// Anything else: diagnostics worth keeping in the log tail.
    Log,
}

/// Incremental parser for interleaved `-progress pipe:2` and diagnostic output.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> LineKind {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            return LineKind::Log;
        };
        let key = key.trim();
        if !PROGRESS_KEYS.contains(&key) && !key.starts_with("stream_") {
            return LineKind::Log;
        }
        let value = value.trim();

        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            // Despite the name, FFmpeg reports microseconds here too
            "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.current.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.current.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    self.current.is_complete = true;
                }
                return LineKind::Progress(Some(self.current.clone()));
            }
            _ => {}
        }

        LineKind::Progress(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert_eq!(progress.percent(10_000), 50);
        assert_eq!(progress.percent(5000), 99);
        assert_eq!(progress.percent(1000), 99);
        assert_eq!(progress.percent(0), 0);
    }

    #[test]
    fn test_eta_calculation() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            speed: 2.0,
            ..Default::default()
        };

        let eta = progress.eta_seconds(10_000).unwrap();
        assert!((eta - 2.5).abs() < 0.01);
    }

    #[test]
    fn test_parser_splits_progress_from_logs() {
        let mut parser = ProgressParser::new();

        assert_eq!(parser.feed("frame=120"), LineKind::Progress(None));
        assert_eq!(parser.feed("out_time_us=4000000"), LineKind::Progress(None));
        assert_eq!(parser.feed("speed=1.5x"), LineKind::Progress(None));
        assert_eq!(parser.feed("stream_0_0_q=28.0"), LineKind::Progress(None));
        assert_eq!(parser.feed("[libx264 @ 0x1] using cpu capabilities"), LineKind::Log);
        assert_eq!(parser.feed("Error opening input: a=b"), LineKind::Log);

        match parser.feed("progress=continue") {
            LineKind::Progress(Some(p)) => {
                assert_eq!(p.out_time_ms, 4000);
                assert_eq!(p.frame, 120);
                assert!((p.speed - 1.5).abs() < 0.01);
                assert!(!p.is_complete);
            }
            other => panic!("unexpected {:?}", other),
        }

        match parser.feed("progress=end") {
            LineKind::Progress(Some(p)) => assert!(p.is_complete),
            other => panic!("unexpected {:?}", other),
        }
    }
}

//! Encoder settings derived from a plan's output format.

use serde::{Deserialize, Serialize};

use rgate_models::{CodecHint, Container, OutputFormat, Quality};

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264", "libvpx-vp9")
    pub codec: String,

    /// Encoding preset; only x264/x265 take one
    pub preset: Option<String>,

    /// Constant Rate Factor (lower is better)
    pub crf: u8,

    /// Fixed video bitrate, replacing CRF rate control
    pub video_bitrate: Option<String>,

    pub audio_codec: String,
    pub audio_bitrate: String,
    pub fps: u32,

    /// Additional FFmpeg output arguments
    pub extra_args: Vec<String>,
}

impl EncodingConfig {
    /// Settings for an output format at the given quality.
    pub fn for_output(format: &OutputFormat, quality: Quality) -> Self {
        let codec = format.codec();

        let (codec_name, preset, crf) = match codec {
            CodecHint::H264 => ("libx264", Some(x26x_preset(quality)), x264_crf(quality)),
            CodecHint::Hevc => ("libx265", Some(x26x_preset(quality)), x264_crf(quality) + 5),
            CodecHint::Vp9 => ("libvpx-vp9", None, vp9_crf(quality)),
        };

        let audio_codec = match format.container {
            Container::Webm => "libopus",
            Container::Mp4 | Container::Mov => "aac",
        };

        let mut extra_args = vec!["-pix_fmt".to_string(), "yuv420p".to_string()];
        match format.container {
            Container::Mp4 | Container::Mov => {
                extra_args.extend(["-movflags".to_string(), "+faststart".to_string()]);
                if codec == CodecHint::Hevc {
                    extra_args.extend(["-tag:v".to_string(), "hvc1".to_string()]);
                }
            }
            Container::Webm => extra_args.extend(["-row-mt".to_string(), "1".to_string()]),
        }

        Self {
            codec: codec_name.to_string(),
            preset: preset.map(str::to_string),
            crf,
            video_bitrate: format.video_bitrate.clone(),
            audio_codec: audio_codec.to_string(),
            audio_bitrate: format.audio_bitrate.clone(),
            fps: format.fps,
            extra_args,
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];

        if let Some(preset) = &self.preset {
            args.extend(["-preset".to_string(), preset.clone()]);
        }

        match &self.video_bitrate {
            Some(bitrate) => args.extend(["-b:v".to_string(), bitrate.clone()]),
            None => {
                args.extend(["-crf".to_string(), self.crf.to_string()]);
                // VP9 needs an explicit zero bitrate for constant quality
                if self.codec == "libvpx-vp9" {
                    args.extend(["-b:v".to_string(), "0".to_string()]);
                }
            }
        }

        args.extend(["-r".to_string(), self.fps.to_string()]);
        args.extend([
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);
        args.extend(self.extra_args.iter().cloned());

        args
    }
}

fn x26x_preset(quality: Quality) -> &'static str {
    match quality {
        Quality::High => "slow",
        Quality::Medium => "medium",
        Quality::Low => "veryfast",
    }
}

fn x264_crf(quality: Quality) -> u8 {
    match quality {
        Quality::High => 18,
        Quality::Medium => 23,
        Quality::Low => 28,
    }
}

fn vp9_crf(quality: Quality) -> u8 {
    match quality {
        Quality::High => 24,
        Quality::Medium => 32,
        Quality::Low => 40,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_quality_tiers() {
        let format = OutputFormat::new(1280, 720);
        let high = EncodingConfig::for_output(&format, Quality::High).to_ffmpeg_args();
        let low = EncodingConfig::for_output(&format, Quality::Low).to_ffmpeg_args();

        assert_eq!(value_after(&high, "-crf"), Some("18"));
        assert_eq!(value_after(&high, "-preset"), Some("slow"));
        assert_eq!(value_after(&low, "-crf"), Some("28"));
        assert_eq!(value_after(&low, "-c:a"), Some("aac"));
        assert_eq!(value_after(&low, "-movflags"), Some("+faststart"));
    }

    #[test]
    fn test_webm_uses_vp9_and_opus() {
        let mut format = OutputFormat::new(640, 360);
        format.container = Container::Webm;
        let args = EncodingConfig::for_output(&format, Quality::Medium).to_ffmpeg_args();

        assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
        assert_eq!(value_after(&args, "-b:v"), Some("0"));
        assert_eq!(value_after(&args, "-c:a"), Some("libopus"));
        assert!(!args.contains(&"-preset".to_string()));
    }

    #[test]
    fn test_explicit_bitrate_replaces_crf() {
        let mut format = OutputFormat::new(640, 360);
        format.video_bitrate = Some("4M".to_string());
        format.fps = 24;
        let args = EncodingConfig::for_output(&format, Quality::Medium).to_ffmpeg_args();

        assert_eq!(value_after(&args, "-b:v"), Some("4M"));
        assert!(!args.contains(&"-crf".to_string()));
        assert_eq!(value_after(&args, "-r"), Some("24"));
    }
}

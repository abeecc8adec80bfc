//! Simple transform requests and their conversion into an implicit plan.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{ModelError, ModelResult};
use crate::plan::{
    expected_output_duration_ms, AudioTrack, Container, ExecutionPlan, OutputFormat, Quality, SourceRef,
    TimelineSegment, VideoFilter,
};
use crate::validation::MAX_DIMENSION;

/// Frame size used when neither the request nor the source provides one.
pub const FALLBACK_WIDTH: u32 = 1280;
pub const FALLBACK_HEIGHT: u32 = 720;

const SOURCE_ID: &str = "source";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_trim_window"))]
pub struct TrimOptions {
    #[serde(default)]
    #[validate(range(min = 0))]
    pub start_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub end_ms: Option<i64>,
}

fn validate_trim_window(trim: &TrimOptions) -> Result<(), ValidationError> {
    match trim.end_ms {
        Some(end) if end <= trim.start_ms => {
            let mut err = ValidationError::new("trim_window");
            err.message = Some("trim.endMs must be greater than trim.startMs".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ResizeOptions {
    #[validate(range(min = 2, max = 7680))]
    pub width: u32,
    #[validate(range(min = 2, max = 7680))]
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AudioOptions {
    #[serde(default)]
    pub mute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub fade_in_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0))]
    pub fade_out_ms: Option<i64>,
}

/// Options accepted by `POST /api/execute`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransformOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub trim: Option<TrimOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(exclusive_min = 0.0, max = 16.0))]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub resize: Option<ResizeOptions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<VideoFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub audio: Option<AudioOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
}

/// What is known about a source before planning, usually from ffprobe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub duration_ms: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: Option<bool>,
}

impl TransformOptions {
    /// Whether the plan depends on something only ffprobe can tell: the
    /// duration, the frame size, or whether there is audio to keep.
    pub fn needs_probe(&self) -> bool {
        let muted = self.audio.as_ref().is_some_and(|a| a.mute);
        self.trim.as_ref().and_then(|t| t.end_ms).is_none() || self.resize.is_none() || !muted
    }

    /// Build the implicit single-segment plan for `source_url`.
    ///
    /// The source's own audio becomes the plan's only declared track when it
    /// is known to exist and is not muted. Unknown audio renders as silence.
    pub fn into_plan(&self, source_url: &str, source: &SourceInfo) -> ModelResult<ExecutionPlan> {
        self.validate()
            .map_err(|e| ModelError::invalid_input(e.to_string()))?;

        if source_url.trim().is_empty() {
            return Err(ModelError::invalid_input("sourcePath is required"));
        }

        let trim_start_ms = self.trim.as_ref().map_or(0, |t| t.start_ms);
        let trim_end_ms = match self.trim.as_ref().and_then(|t| t.end_ms).or(source.duration_ms) {
            Some(end) => end,
            None => {
                return Err(ModelError::invalid_input(
                    "Could not determine source duration; provide trim.endMs",
                ))
            }
        };
        if trim_end_ms <= trim_start_ms {
            return Err(ModelError::invalid_input(format!(
                "Trim window {}..{}ms is empty",
                trim_start_ms, trim_end_ms
            )));
        }
        if let Some(duration) = source.duration_ms {
            if trim_end_ms > duration {
                return Err(ModelError::invalid_input(format!(
                    "trim.endMs {} exceeds source duration {}ms",
                    trim_end_ms, duration
                )));
            }
        }

        let speed = self.speed.unwrap_or(1.0);

        let (width, height) = match &self.resize {
            Some(resize) => {
                if resize.width % 2 != 0 || resize.height % 2 != 0 {
                    return Err(ModelError::invalid_input("resize width and height must be even"));
                }
                (resize.width, resize.height)
            }
            None => match (source.width, source.height) {
                (Some(w), Some(h)) if w >= 2 && h >= 2 => {
                    (even(w.min(MAX_DIMENSION)), even(h.min(MAX_DIMENSION)))
                }
                _ => (FALLBACK_WIDTH, FALLBACK_HEIGHT),
            },
        };

        let source_container = Container::from_path(source_url);
        let mut output_format = OutputFormat::new(width, height);
        output_format.container = self.format.or(source_container).unwrap_or_default();
        output_format.quality = self.quality;

        let output_duration_ms = expected_output_duration_ms(trim_start_ms, trim_end_ms, speed);

        let segment = TimelineSegment {
            segment_id: "main".to_string(),
            source_video_id: Some(SOURCE_ID.to_string()),
            source_segment_id: None,
            asset_url: None,
            trim_start_ms,
            trim_end_ms,
            source_duration_ms: source.duration_ms,
            timeline_start_ms: 0,
            timeline_end_ms: output_duration_ms,
            output_duration_ms,
            speed_multiplier: speed,
            track: "video".to_string(),
            layer: 0,
            filters: self.filters.clone(),
            transition_in: None,
        };

        let audio = self.audio.clone().unwrap_or_default();
        let mut audio_tracks = Vec::new();
        if !audio.mute && source.has_audio == Some(true) {
            let volume = audio.volume.unwrap_or(1.0);
            audio_tracks.push(AudioTrack {
                audio_id: "source-audio".to_string(),
                asset_url: None,
                source_video_id: Some(SOURCE_ID.to_string()),
                trim_start_ms,
                trim_end_ms,
                timeline_start_ms: 0,
                timeline_end_ms: Some(output_duration_ms),
                volume,
                fade_in_ms: audio.fade_in_ms.unwrap_or(0),
                fade_out_ms: audio.fade_out_ms.unwrap_or(0),
                speed_multiplier: speed,
                track: "source".to_string(),
            });
        }

        Ok(ExecutionPlan {
            plan_id: format!("transform-{}", Uuid::new_v4()),
            project_id: None,
            source_video_url: Some(source_url.to_string()),
            sources: vec![SourceRef {
                id: SOURCE_ID.to_string(),
                url: source_url.to_string(),
                width: source.width,
                height: source.height,
                container: source_container,
                duration_ms: source.duration_ms,
            }],
            output_format,
            timeline: vec![segment],
            audio_tracks,
            text_overlays: Vec::new(),
            validation: None,
        })
    }
}

fn even(n: u32) -> u32 {
    n - n % 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_plan;

    fn probed() -> SourceInfo {
        SourceInfo {
            duration_ms: Some(20_000),
            width: Some(1920),
            height: Some(1080),
            has_audio: Some(true),
        }
    }

    #[test]
    fn test_deserialize_camel_case() {
        let opts: TransformOptions = serde_json::from_str(
            r#"{"trim":{"startMs":1000,"endMs":4000},"speed":2,"audio":{"volume":0.8,"fadeInMs":200},"format":"webm"}"#,
        )
        .unwrap();
        assert_eq!(opts.trim.as_ref().unwrap().end_ms, Some(4000));
        assert_eq!(opts.format, Some(Container::Webm));
        assert_eq!(opts.audio.as_ref().unwrap().fade_in_ms, Some(200));
    }

    #[test]
    fn test_into_plan_single_segment() {
        let opts = TransformOptions {
            trim: Some(TrimOptions {
                start_ms: 1000,
                end_ms: Some(5000),
            }),
            speed: Some(2.0),
            ..Default::default()
        };
        let plan = opts.into_plan("/uploads/in.mp4", &probed()).unwrap();

        assert_eq!(plan.timeline.len(), 1);
        let segment = &plan.timeline[0];
        assert_eq!(segment.output_duration_ms, 2000);
        assert_eq!(segment.timeline_end_ms, 2000);
        assert_eq!(plan.output_format.width, 1920);
        assert_eq!(plan.output_format.container, Container::Mp4);
        assert_eq!(plan.audio_tracks.len(), 1);
        assert_eq!(plan.audio_asset(&plan.audio_tracks[0]), Some("/uploads/in.mp4"));

        validate_plan(&plan).unwrap();
    }

    #[test]
    fn test_mute_and_missing_audio_drop_track() {
        let opts = TransformOptions {
            audio: Some(AudioOptions {
                mute: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(opts.into_plan("/uploads/in.mp4", &probed()).unwrap().audio_tracks.is_empty());

        let silent = SourceInfo {
            has_audio: Some(false),
            ..probed()
        };
        let plan = TransformOptions::default().into_plan("/uploads/in.mp4", &silent).unwrap();
        assert!(plan.audio_tracks.is_empty());
    }

    #[test]
    fn test_unknown_audio_renders_silence() {
        let opts = TransformOptions {
            trim: Some(TrimOptions {
                start_ms: 0,
                end_ms: Some(2000),
            }),
            resize: Some(ResizeOptions { width: 640, height: 360 }),
            ..Default::default()
        };
        // Audio presence is unknown until the source is inspected
        assert!(opts.needs_probe());

        let plan = opts.into_plan("/uploads/in.mp4", &SourceInfo::default()).unwrap();
        assert!(plan.audio_tracks.is_empty());
        validate_plan(&plan).unwrap();

        let with_audio = SourceInfo {
            has_audio: Some(true),
            ..Default::default()
        };
        let plan = opts.into_plan("/uploads/in.mp4", &with_audio).unwrap();
        assert_eq!(plan.audio_tracks.len(), 1);
    }

    #[test]
    fn test_fully_specified_muted_request_is_planned_directly() {
        let opts = TransformOptions {
            trim: Some(TrimOptions {
                start_ms: 0,
                end_ms: Some(2000),
            }),
            resize: Some(ResizeOptions { width: 640, height: 360 }),
            audio: Some(AudioOptions {
                mute: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!opts.needs_probe());
    }

    #[test]
    fn test_unknown_duration_is_input_error() {
        let opts = TransformOptions::default();
        assert!(opts.needs_probe());
        let err = opts.into_plan("/uploads/in.mp4", &SourceInfo::default()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[test]
    fn test_fallback_size_without_probe() {
        let opts = TransformOptions {
            trim: Some(TrimOptions {
                start_ms: 0,
                end_ms: Some(3000),
            }),
            ..Default::default()
        };
        let plan = opts.into_plan("https://cdn.example.com/clip", &SourceInfo::default()).unwrap();
        assert_eq!((plan.output_format.width, plan.output_format.height), (1280, 720));
    }

    #[test]
    fn test_request_shape_validation() {
        let bad_speed = TransformOptions {
            speed: Some(0.0),
            ..Default::default()
        };
        assert!(bad_speed.validate().is_err());

        let bad_trim = TransformOptions {
            trim: Some(TrimOptions {
                start_ms: 5000,
                end_ms: Some(1000),
            }),
            ..Default::default()
        };
        assert!(bad_trim.into_plan("/uploads/in.mp4", &probed()).is_err());

        let odd = TransformOptions {
            resize: Some(ResizeOptions { width: 641, height: 360 }),
            ..Default::default()
        };
        assert!(odd.into_plan("/uploads/in.mp4", &probed()).is_err());
    }

    #[test]
    fn test_trim_past_source_end_rejected() {
        let opts = TransformOptions {
            trim: Some(TrimOptions {
                start_ms: 0,
                end_ms: Some(30_000),
            }),
            ..Default::default()
        };
        assert!(opts.into_plan("/uploads/in.mp4", &probed()).is_err());
    }
}

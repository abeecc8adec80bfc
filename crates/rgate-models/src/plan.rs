//! Execution plan data model.
//!
//! An [`ExecutionPlan`] is the declarative, timestamped description of an
//! edit. It is immutable once submitted: the worker only ever reads it, and
//! the one rewrite it performs ([`ExecutionPlan::localized`]) produces a new
//! value pointing at fetched copies of the same assets.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default output frame rate.
pub const DEFAULT_FPS: u32 = 30;
/// Default audio bitrate.
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default drawtext font size.
pub const DEFAULT_FONT_SIZE: u32 = 48;

// ============================================================================
// Output format
// ============================================================================

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
            Container::Mov => "mov",
        }
    }

    /// File extension for rendered artifacts.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Webm => "video/webm",
            Container::Mov => "video/quicktime",
        }
    }

    /// Guess the container from a file name or URL path.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" => Some(Container::Mp4),
            "webm" => Some(Container::Webm),
            "mov" | "qt" => Some(Container::Mov),
            _ => None,
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video codec preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CodecHint {
    H264,
    Hevc,
    Vp9,
}

impl CodecHint {
    /// Whether the codec can be muxed into the container.
    pub fn fits(&self, container: Container) -> bool {
        match (self, container) {
            (CodecHint::Vp9, _) => container != Container::Mov,
            (CodecHint::H264 | CodecHint::Hevc, Container::Webm) => false,
            (CodecHint::H264 | CodecHint::Hevc, Container::Mp4 | Container::Mov) => true,
        }
    }
}

/// Encode quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

/// Rendered output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputFormat {
    #[serde(default)]
    pub container: Container,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Target video bitrate (e.g. "4M"). Quality-based rate control when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_bitrate: Option<String>,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec_hint: Option<CodecHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
}

impl OutputFormat {
    /// Output format with defaults for everything but the frame size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            container: Container::default(),
            width,
            height,
            fps: DEFAULT_FPS,
            video_bitrate: None,
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            codec_hint: None,
            quality: None,
        }
    }

    /// Effective codec: the hint, or the container's natural codec.
    pub fn codec(&self) -> CodecHint {
        self.codec_hint.unwrap_or(match self.container {
            Container::Webm => CodecHint::Vp9,
            Container::Mp4 | Container::Mov => CodecHint::H264,
        })
    }
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

// ============================================================================
// Sources
// ============================================================================

/// A source media file referenced by the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceRef {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

// ============================================================================
// Timeline
// ============================================================================

/// Per-segment visual filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VideoFilter {
    Grayscale,
    Blur {
        #[serde(default = "default_blur_sigma")]
        sigma: f64,
    },
    Sharpen,
    Brightness { value: f64 },
    Contrast { value: f64 },
    Saturation { value: f64 },
}

fn default_blur_sigma() -> f64 {
    4.0
}

/// Transition kind applied at the head of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    #[default]
    Fade,
}

/// Transition into a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    #[serde(default)]
    pub kind: TransitionKind,
    pub duration_ms: i64,
}

/// One trimmed, speed-adjusted instance of a source clip on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimelineSegment {
    pub segment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    pub trim_start_ms: i64,
    pub trim_end_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration_ms: Option<i64>,
    pub timeline_start_ms: i64,
    pub timeline_end_ms: i64,
    pub output_duration_ms: i64,
    #[serde(default = "default_speed")]
    pub speed_multiplier: f64,
    #[serde(default = "default_video_track")]
    pub track: String,
    /// 0 is the base (concatenated) layer; higher layers are composited on top.
    #[serde(default)]
    pub layer: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<VideoFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_in: Option<Transition>,
}

impl TimelineSegment {
    pub fn is_base_layer(&self) -> bool {
        self.layer == 0
    }

    pub fn changes_speed(&self) -> bool {
        (self.speed_multiplier - 1.0).abs() > f64::EPSILON
    }

    /// Whether the segment window overlaps another.
    pub fn overlaps(&self, other: &TimelineSegment) -> bool {
        self.timeline_start_ms < other.timeline_end_ms
            && other.timeline_start_ms < self.timeline_end_ms
    }
}

fn default_speed() -> f64 {
    1.0
}

fn default_video_track() -> String {
    "video".to_string()
}

fn default_audio_track() -> String {
    "music".to_string()
}

fn default_volume() -> f64 {
    1.0
}

/// `round((trim_end - trim_start) / speed)`.
pub fn expected_output_duration_ms(trim_start_ms: i64, trim_end_ms: i64, speed: f64) -> i64 {
    ((trim_end_ms - trim_start_ms) as f64 / speed).round() as i64
}

// ============================================================================
// Audio
// ============================================================================

/// Independent audio layer. Tracks are always mixed, never replace each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioTrack {
    pub audio_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_video_id: Option<String>,
    pub trim_start_ms: i64,
    pub trim_end_ms: i64,
    pub timeline_start_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline_end_ms: Option<i64>,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub fade_in_ms: i64,
    #[serde(default)]
    pub fade_out_ms: i64,
    #[serde(default = "default_speed")]
    pub speed_multiplier: f64,
    #[serde(default = "default_audio_track")]
    pub track: String,
}

impl AudioTrack {
    /// Duration on the output timeline after speed adjustment.
    pub fn output_duration_ms(&self) -> i64 {
        expected_output_duration_ms(self.trim_start_ms, self.trim_end_ms, self.speed_multiplier)
    }

    pub fn has_fade(&self) -> bool {
        self.fade_in_ms > 0 || self.fade_out_ms > 0
    }
}

// ============================================================================
// Text overlays
// ============================================================================

/// Vertical placement preset for text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

/// Box drawn behind overlay text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextBackground {
    #[serde(default = "default_box_color")]
    pub color: String,
    #[serde(default = "default_box_opacity")]
    pub opacity: f64,
    #[serde(default = "default_box_padding")]
    pub padding: u32,
}

fn default_box_color() -> String {
    "black".to_string()
}

fn default_box_opacity() -> f64 {
    0.5
}

fn default_box_padding() -> u32 {
    12
}

/// Timed text drawn onto the composited video stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextOverlay {
    pub text_id: String,
    pub content: String,
    pub timeline_start_ms: i64,
    pub timeline_end_ms: i64,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_font_color")]
    pub font_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_file: Option<String>,
    #[serde(default)]
    pub position: TextPosition,
    /// Explicit x expression; overrides the horizontal centering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// Explicit y expression; overrides `position`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<TextBackground>,
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

fn default_font_color() -> String {
    "white".to_string()
}

// ============================================================================
// Plan
// ============================================================================

/// Derived summary attached after validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanValidation {
    pub segment_count: usize,
    pub base_segment_count: usize,
    pub layer_segment_count: usize,
    pub audio_track_count: usize,
    pub text_overlay_count: usize,
    pub output_duration_ms: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Declarative, timestamped description of a video edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionPlan {
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Default source for items that name neither an asset nor a source id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    pub output_format: OutputFormat,
    pub timeline: Vec<TimelineSegment>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrack>,
    #[serde(default)]
    pub text_overlays: Vec<TextOverlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<PlanValidation>,
}

impl ExecutionPlan {
    /// Segments concatenated into the base video stream, in timeline order.
    pub fn base_segments(&self) -> impl Iterator<Item = &TimelineSegment> {
        self.timeline.iter().filter(|s| s.is_base_layer())
    }

    /// Segments composited above the base stream.
    pub fn layer_segments(&self) -> impl Iterator<Item = &TimelineSegment> {
        self.timeline.iter().filter(|s| !s.is_base_layer())
    }

    /// Rendered duration: the concatenated length of the base layer.
    pub fn output_duration_ms(&self) -> i64 {
        self.base_segments().map(|s| s.output_duration_ms.max(0)).sum()
    }

    fn source(&self, id: &str) -> Option<&SourceRef> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Resolve an item's asset: own url, then named source, then the default source.
    pub fn resolve_asset<'a>(
        &'a self,
        asset_url: Option<&'a str>,
        source_video_id: Option<&str>,
    ) -> Option<&'a str> {
        if let Some(url) = asset_url.filter(|u| !u.trim().is_empty()) {
            return Some(url);
        }
        if let Some(id) = source_video_id {
            return self.source(id).map(|s| s.url.as_str());
        }
        self.source_video_url.as_deref().filter(|u| !u.trim().is_empty())
    }

    pub fn segment_asset<'a>(&'a self, segment: &'a TimelineSegment) -> Option<&'a str> {
        self.resolve_asset(segment.asset_url.as_deref(), segment.source_video_id.as_deref())
    }

    pub fn audio_asset<'a>(&'a self, track: &'a AudioTrack) -> Option<&'a str> {
        self.resolve_asset(track.asset_url.as_deref(), track.source_video_id.as_deref())
    }

    /// Source metadata describing a segment's asset, when declared.
    pub fn segment_source(&self, segment: &TimelineSegment) -> Option<&SourceRef> {
        if let Some(id) = segment.source_video_id.as_deref() {
            if let Some(source) = self.source(id) {
                return Some(source);
            }
        }
        let url = self.segment_asset(segment)?;
        self.sources.iter().find(|s| s.url == url)
    }

    /// Distinct resolved asset URLs in first-use order (video first, then audio).
    pub fn asset_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        let video = self.timeline.iter().filter_map(|s| self.segment_asset(s));
        let audio = self.audio_tracks.iter().filter_map(|t| self.audio_asset(t));
        for url in video.chain(audio) {
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    /// Copy of the plan with every resolvable asset pinned to `paths[url]`.
    ///
    /// Items whose asset is not in the map keep their resolved URL.
    pub fn localized(&self, paths: &HashMap<String, String>) -> ExecutionPlan {
        let mut plan = self.clone();
        for (i, segment) in self.timeline.iter().enumerate() {
            if let Some(url) = self.segment_asset(segment) {
                let local = paths.get(url).cloned().unwrap_or_else(|| url.to_string());
                plan.timeline[i].asset_url = Some(local);
            }
        }
        for (i, track) in self.audio_tracks.iter().enumerate() {
            if let Some(url) = self.audio_asset(track) {
                let local = paths.get(url).cloned().unwrap_or_else(|| url.to_string());
                plan.audio_tracks[i].asset_url = Some(local);
            }
        }
        plan
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn segment(id: &str, trim: (i64, i64), timeline_start_ms: i64, speed: f64) -> TimelineSegment {
        let output = expected_output_duration_ms(trim.0, trim.1, speed);
        TimelineSegment {
            segment_id: id.to_string(),
            source_video_id: None,
            source_segment_id: None,
            asset_url: Some(format!("/uploads/{}.mp4", id)),
            trim_start_ms: trim.0,
            trim_end_ms: trim.1,
            source_duration_ms: Some(60_000),
            timeline_start_ms,
            timeline_end_ms: timeline_start_ms + output,
            output_duration_ms: output,
            speed_multiplier: speed,
            track: "video".to_string(),
            layer: 0,
            filters: Vec::new(),
            transition_in: None,
        }
    }

    pub fn audio(id: &str, volume: f64) -> AudioTrack {
        AudioTrack {
            audio_id: id.to_string(),
            asset_url: Some(format!("/uploads/{}.mp3", id)),
            source_video_id: None,
            trim_start_ms: 0,
            trim_end_ms: 7000,
            timeline_start_ms: 0,
            timeline_end_ms: None,
            volume,
            fade_in_ms: 0,
            fade_out_ms: 0,
            speed_multiplier: 1.0,
            track: "music".to_string(),
        }
    }

    pub fn text(id: &str, content: &str, start: i64, end: i64) -> TextOverlay {
        TextOverlay {
            text_id: id.to_string(),
            content: content.to_string(),
            timeline_start_ms: start,
            timeline_end_ms: end,
            font_size: DEFAULT_FONT_SIZE,
            font_color: "white".to_string(),
            font_file: None,
            position: TextPosition::Bottom,
            x: None,
            y: None,
            background: None,
        }
    }

    /// Two segments (5000ms, 2000ms), one track at 0.5, one "Hello World" overlay.
    pub fn reference_plan() -> ExecutionPlan {
        ExecutionPlan {
            plan_id: "plan-ref".to_string(),
            project_id: Some("project-1".to_string()),
            source_video_url: None,
            sources: Vec::new(),
            output_format: OutputFormat::new(1080, 1920),
            timeline: vec![segment("s1", (0, 5000), 0, 1.0), segment("s2", (10_000, 12_000), 5000, 1.0)],
            audio_tracks: vec![audio("music", 0.5)],
            text_overlays: vec![text("t1", "Hello World", 0, 3000)],
            validation: None,
        }
    }
}

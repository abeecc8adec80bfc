//! Structural validation of execution plans.
//!
//! A plan must pass [`validate_plan`] before it is routed or compiled, so
//! the compiler never has to discover a malformed plan halfway through.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::plan::{expected_output_duration_ms, ExecutionPlan, PlanValidation, TextOverlay};

/// Tolerance for the output duration rounding check.
pub const DURATION_TOLERANCE_MS: i64 = 1;
/// Highest accepted speed multiplier.
pub const MAX_SPEED: f64 = 16.0;
/// Highest accepted audio volume.
pub const MAX_VOLUME: f64 = 2.0;
/// Largest accepted output edge.
pub const MAX_DIMENSION: u32 = 7680;

/// Named color or `#RRGGBB`, optionally with an `@alpha` suffix.
static COLOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[#A-Za-z0-9]+(@[0-9.]+)?$").expect("color pattern"));

/// Characters that would end a drawtext option or open a new graph node.
const GRAPH_SYNTAX: [char; 6] = [';', '[', ']', ',', '\'', '\\'];

/// A single structural problem, addressed by a JSON-ish path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanIssue {
    pub path: String,
    pub message: String,
}

impl PlanIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Default)]
struct Issues(Vec<PlanIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(PlanIssue::new(path, message));
    }
}

/// Validate a plan and compute its summary.
pub fn validate_plan(plan: &ExecutionPlan) -> ModelResult<PlanValidation> {
    let mut issues = Issues::default();
    let mut warnings = Vec::new();

    check_output_format(plan, &mut issues);
    check_timeline(plan, &mut issues, &mut warnings);
    check_audio(plan, &mut issues);
    check_overlays(plan, &mut issues);

    if !issues.0.is_empty() {
        return Err(ModelError::InvalidPlan(issues.0));
    }

    Ok(PlanValidation {
        segment_count: plan.timeline.len(),
        base_segment_count: plan.base_segments().count(),
        layer_segment_count: plan.layer_segments().count(),
        audio_track_count: plan.audio_tracks.len(),
        text_overlay_count: plan.text_overlays.len(),
        output_duration_ms: plan.output_duration_ms(),
        warnings,
    })
}

fn check_output_format(plan: &ExecutionPlan, issues: &mut Issues) {
    let format = &plan.output_format;

    for (name, value) in [("width", format.width), ("height", format.height)] {
        if value == 0 || value > MAX_DIMENSION {
            issues.push(
                format!("output_format.{}", name),
                format!("must be between 1 and {}", MAX_DIMENSION),
            );
        } else if value % 2 != 0 {
            issues.push(format!("output_format.{}", name), "must be even for yuv420p output");
        }
    }

    if format.fps == 0 || format.fps > 120 {
        issues.push("output_format.fps", "must be between 1 and 120");
    }

    if !format.codec().fits(format.container) {
        issues.push(
            "output_format.codec_hint",
            format!("{:?} cannot be written to a {} container", format.codec(), format.container),
        );
    }
}

fn check_timeline(plan: &ExecutionPlan, issues: &mut Issues, warnings: &mut Vec<String>) {
    if plan.base_segments().next().is_none() {
        issues.push("timeline", "must contain at least one segment on layer 0");
    }

    let mut seen_ids: HashMap<&str, usize> = HashMap::new();
    // Last segment end per (track, layer), for overlap detection.
    let mut lane_end: HashMap<(&str, u32), (i64, &str)> = HashMap::new();
    let mut previous_start = i64::MIN;
    let mut previous_base_end: Option<i64> = None;

    for (i, seg) in plan.timeline.iter().enumerate() {
        let path = |field: &str| format!("timeline[{}].{}", i, field);

        if let Some(first) = seen_ids.insert(seg.segment_id.as_str(), i) {
            issues.push(path("segment_id"), format!("duplicates timeline[{}]", first));
        }

        if plan.segment_asset(seg).is_none() {
            issues.push(path("asset_url"), "dangling reference: no asset_url, known source_video_id or source_video_url");
        }

        if seg.trim_start_ms < 0 {
            issues.push(path("trim_start_ms"), "must not be negative");
        }
        if seg.trim_end_ms <= seg.trim_start_ms {
            issues.push(path("trim_end_ms"), "must be after trim_start_ms");
        }
        if let Some(source_duration) = seg.source_duration_ms {
            if seg.trim_end_ms > source_duration {
                issues.push(path("trim_end_ms"), format!("exceeds source duration {}ms", source_duration));
            }
        }

        if !(seg.speed_multiplier > 0.0 && seg.speed_multiplier <= MAX_SPEED) {
            issues.push(path("speed_multiplier"), format!("must be in (0, {}]", MAX_SPEED));
        } else if seg.trim_end_ms > seg.trim_start_ms {
            let expected = expected_output_duration_ms(seg.trim_start_ms, seg.trim_end_ms, seg.speed_multiplier);
            if (seg.output_duration_ms - expected).abs() > DURATION_TOLERANCE_MS {
                issues.push(
                    path("output_duration_ms"),
                    format!("expected {}ms for the trim window at {}x", expected, seg.speed_multiplier),
                );
            }
        }

        if seg.timeline_start_ms < 0 {
            issues.push(path("timeline_start_ms"), "must not be negative");
        }
        if (seg.timeline_end_ms - seg.timeline_start_ms - seg.output_duration_ms).abs() > DURATION_TOLERANCE_MS {
            issues.push(path("timeline_end_ms"), "must equal timeline_start_ms + output_duration_ms");
        }

        if seg.timeline_start_ms < previous_start {
            issues.push(path("timeline_start_ms"), "timeline must be ordered by timeline_start_ms");
        }
        previous_start = seg.timeline_start_ms;

        let lane = (seg.track.as_str(), seg.layer);
        if let Some((end, other)) = lane_end.get(&lane) {
            if seg.timeline_start_ms < *end {
                issues.push(
                    path("timeline_start_ms"),
                    format!("overlaps segment '{}' on track '{}' layer {}", other, seg.track, seg.layer),
                );
            }
        }
        lane_end.insert(lane, (seg.timeline_end_ms, seg.segment_id.as_str()));

        if let Some(transition) = &seg.transition_in {
            if transition.duration_ms <= 0 || transition.duration_ms > seg.output_duration_ms {
                issues.push(path("transition_in.duration_ms"), "must be positive and fit inside the segment");
            }
        }

        if seg.is_base_layer() {
            if let Some(end) = previous_base_end {
                if seg.timeline_start_ms > end {
                    warnings.push(format!(
                        "gap of {}ms before segment '{}' is closed by concatenation",
                        seg.timeline_start_ms - end,
                        seg.segment_id
                    ));
                }
            }
            previous_base_end = Some(seg.timeline_end_ms);
        }
    }
}

fn check_audio(plan: &ExecutionPlan, issues: &mut Issues) {
    for (i, track) in plan.audio_tracks.iter().enumerate() {
        let path = |field: &str| format!("audio_tracks[{}].{}", i, field);

        if plan.audio_asset(track).is_none() {
            issues.push(path("asset_url"), "dangling reference: no asset_url, known source_video_id or source_video_url");
        }
        if track.trim_start_ms < 0 {
            issues.push(path("trim_start_ms"), "must not be negative");
        }
        if track.trim_end_ms <= track.trim_start_ms {
            issues.push(path("trim_end_ms"), "must be after trim_start_ms");
        }
        if track.timeline_start_ms < 0 {
            issues.push(path("timeline_start_ms"), "must not be negative");
        }
        if !(0.0..=MAX_VOLUME).contains(&track.volume) {
            issues.push(path("volume"), format!("must be between 0 and {}", MAX_VOLUME));
        }
        if !(track.speed_multiplier > 0.0 && track.speed_multiplier <= MAX_SPEED) {
            issues.push(path("speed_multiplier"), format!("must be in (0, {}]", MAX_SPEED));
            continue;
        }

        let duration = track.output_duration_ms();
        if track.fade_in_ms < 0 || track.fade_out_ms < 0 {
            issues.push(path("fade_in_ms"), "fades must not be negative");
        } else if duration > 0 && track.fade_in_ms + track.fade_out_ms > duration {
            issues.push(path("fade_out_ms"), "fade in + fade out exceed the track duration");
        }

        if let Some(end) = track.timeline_end_ms {
            if (end - track.timeline_start_ms - duration).abs() > DURATION_TOLERANCE_MS {
                issues.push(path("timeline_end_ms"), format!("expected {}ms after timeline_start_ms", duration));
            }
        }
    }
}

fn check_overlays(plan: &ExecutionPlan, issues: &mut Issues) {
    for (i, overlay) in plan.text_overlays.iter().enumerate() {
        let path = |field: &str| format!("text_overlays[{}].{}", i, field);

        if overlay.content.is_empty() {
            issues.push(path("content"), "must not be empty");
        }
        if overlay.timeline_start_ms < 0 {
            issues.push(path("timeline_start_ms"), "must not be negative");
        }
        if overlay.timeline_end_ms <= overlay.timeline_start_ms {
            issues.push(path("timeline_end_ms"), "must be after timeline_start_ms");
        }
        if overlay.font_size == 0 {
            issues.push(path("font_size"), "must be positive");
        }
        if let Some(bg) = &overlay.background {
            if !(0.0..=1.0).contains(&bg.opacity) {
                issues.push(path("background.opacity"), "must be between 0 and 1");
            }
        }
        for issue in overlay_syntax_issues(overlay) {
            issues.push(path(&issue.path), issue.message);
        }
    }
}

/// Overlay fields that are spliced into a drawtext node and would break out
/// of it. Paths are relative to the overlay.
pub fn overlay_syntax_issues(overlay: &TextOverlay) -> Vec<PlanIssue> {
    let mut issues = Vec::new();

    if !COLOR_PATTERN.is_match(&overlay.font_color) {
        issues.push(PlanIssue::new("font_color", "must be a color name or #RRGGBB, optionally @alpha"));
    }
    if let Some(bg) = &overlay.background {
        if !COLOR_PATTERN.is_match(&bg.color) || bg.color.contains('@') {
            issues.push(PlanIssue::new("background.color", "must be a color name or #RRGGBB"));
        }
    }

    let expressions = [
        ("x", overlay.x.as_deref()),
        ("y", overlay.y.as_deref()),
        ("font_file", overlay.font_file.as_deref()),
    ];
    for (field, value) in expressions {
        if let Some(value) = value {
            if value.trim().is_empty() || value.contains(GRAPH_SYNTAX) {
                issues.push(PlanIssue::new(field, "must be non-empty and free of ; [ ] , ' and backslashes"));
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::fixtures::*;
    use crate::plan::{CodecHint, Container};

    fn issue_paths(plan: &ExecutionPlan) -> Vec<String> {
        match validate_plan(plan) {
            Err(ModelError::InvalidPlan(issues)) => issues.into_iter().map(|i| i.path).collect(),
            other => panic!("expected invalid plan, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_plan_is_valid() {
        let summary = validate_plan(&reference_plan()).unwrap();
        assert_eq!(summary.base_segment_count, 2);
        assert_eq!(summary.audio_track_count, 1);
        assert_eq!(summary.text_overlay_count, 1);
        assert_eq!(summary.output_duration_ms, 7000);
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn test_negative_and_inverted_trims_rejected() {
        let mut plan = reference_plan();
        plan.timeline[0].trim_start_ms = -10;
        plan.timeline[1].trim_end_ms = plan.timeline[1].trim_start_ms;
        let paths = issue_paths(&plan);
        assert!(paths.contains(&"timeline[0].trim_start_ms".to_string()));
        assert!(paths.contains(&"timeline[1].trim_end_ms".to_string()));
    }

    #[test]
    fn test_output_duration_must_match_speed() {
        let mut plan = reference_plan();
        plan.timeline[0].speed_multiplier = 2.0;
        let paths = issue_paths(&plan);
        assert!(paths.contains(&"timeline[0].output_duration_ms".to_string()));

        // Within the 1ms rounding tolerance is fine.
        let mut plan = reference_plan();
        plan.timeline[0] = segment("fast", (0, 1000), 0, 3.0);
        plan.timeline[0].output_duration_ms = 334;
        plan.timeline[0].timeline_end_ms = 334;
        plan.timeline[1].timeline_start_ms = 334;
        plan.timeline[1].timeline_end_ms = 2334;
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn test_overlap_on_same_lane_rejected_but_other_layer_allowed() {
        let mut plan = reference_plan();
        plan.timeline[1].timeline_start_ms = 4000;
        plan.timeline[1].timeline_end_ms = 6000;
        assert!(issue_paths(&plan).contains(&"timeline[1].timeline_start_ms".to_string()));

        plan.timeline[1].layer = 1;
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn test_unordered_timeline_rejected() {
        let mut plan = reference_plan();
        plan.timeline.swap(0, 1);
        assert!(issue_paths(&plan).contains(&"timeline[1].timeline_start_ms".to_string()));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut plan = reference_plan();
        plan.timeline[0].asset_url = None;
        plan.timeline[0].source_video_id = Some("nope".to_string());
        assert!(issue_paths(&plan).contains(&"timeline[0].asset_url".to_string()));
    }

    #[test]
    fn test_audio_bounds() {
        let mut plan = reference_plan();
        plan.audio_tracks[0].volume = 2.5;
        plan.audio_tracks[0].fade_in_ms = 5000;
        plan.audio_tracks[0].fade_out_ms = 5000;
        let paths = issue_paths(&plan);
        assert!(paths.contains(&"audio_tracks[0].volume".to_string()));
        assert!(paths.contains(&"audio_tracks[0].fade_out_ms".to_string()));
    }

    #[test]
    fn test_empty_overlay_window_rejected() {
        let mut plan = reference_plan();
        plan.text_overlays[0].timeline_end_ms = plan.text_overlays[0].timeline_start_ms;
        assert!(issue_paths(&plan).contains(&"text_overlays[0].timeline_end_ms".to_string()));
    }

    #[test]
    fn test_overlay_fields_cannot_open_graph_nodes() {
        let mut plan = reference_plan();
        plan.text_overlays[0].font_color = "white[x];movie=/etc/passwd[leak];[leak]nullsink;[x]null".to_string();
        plan.text_overlays[0].x = Some("10,movie=/etc/passwd".to_string());
        plan.text_overlays[0].font_file = Some("/tmp/a.ttf';x".to_string());
        plan.text_overlays[0].background = Some(crate::plan::TextBackground {
            color: "black@0.5".to_string(),
            opacity: 0.5,
            padding: 8,
        });
        let paths = issue_paths(&plan);
        assert!(paths.contains(&"text_overlays[0].font_color".to_string()));
        assert!(paths.contains(&"text_overlays[0].x".to_string()));
        assert!(paths.contains(&"text_overlays[0].font_file".to_string()));
        assert!(paths.contains(&"text_overlays[0].background.color".to_string()));
    }

    #[test]
    fn test_overlay_colors_and_expressions_accepted() {
        let mut plan = reference_plan();
        plan.text_overlays[0].font_color = "#FFCC00@0.8".to_string();
        plan.text_overlays[0].x = Some("(w-text_w)/2".to_string());
        plan.text_overlays[0].y = Some("h-text_h-40".to_string());
        plan.text_overlays[0].font_file = Some("/usr/share/fonts/DejaVuSans.ttf".to_string());
        assert!(validate_plan(&plan).is_ok());
    }

    #[test]
    fn test_output_format_checks() {
        let mut plan = reference_plan();
        plan.output_format.width = 1081;
        plan.output_format.container = Container::Webm;
        plan.output_format.codec_hint = Some(CodecHint::H264);
        let paths = issue_paths(&plan);
        assert!(paths.contains(&"output_format.width".to_string()));
        assert!(paths.contains(&"output_format.codec_hint".to_string()));
    }

    #[test]
    fn test_gap_produces_warning() {
        let mut plan = reference_plan();
        plan.timeline[1].timeline_start_ms = 6000;
        plan.timeline[1].timeline_end_ms = 8000;
        let summary = validate_plan(&plan).unwrap();
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.output_duration_ms, 7000);
    }
}

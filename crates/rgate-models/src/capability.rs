//! Processing capabilities and their extraction from a plan.

use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::plan::{Container, ExecutionPlan};

/// A processing feature a plan may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Trim,
    SpeedChange,
    Resize,
    FormatConvert,
    SegmentReplace,
    AudioMux,
    AudioFade,
    AdvancedFilters,
    Overlay,
    Transition,
    TextOverlay,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Trim,
        Capability::SpeedChange,
        Capability::Resize,
        Capability::FormatConvert,
        Capability::SegmentReplace,
        Capability::AudioMux,
        Capability::AudioFade,
        Capability::AdvancedFilters,
        Capability::Overlay,
        Capability::Transition,
        Capability::TextOverlay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Trim => "trim",
            Capability::SpeedChange => "speed_change",
            Capability::Resize => "resize",
            Capability::FormatConvert => "format_convert",
            Capability::SegmentReplace => "segment_replace",
            Capability::AudioMux => "audio_mux",
            Capability::AudioFade => "audio_fade",
            Capability::AdvancedFilters => "advanced_filters",
            Capability::Overlay => "overlay",
            Capability::Transition => "transition",
            Capability::TextOverlay => "text_overlay",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of capabilities.
pub type CapabilitySet = BTreeSet<Capability>;

/// Derive the capabilities a plan needs. Pure; the same plan always yields the same set.
pub fn required_capabilities(plan: &ExecutionPlan) -> CapabilitySet {
    let mut required = CapabilitySet::new();
    let output = &plan.output_format;

    if plan.base_segments().count() > 1 {
        required.insert(Capability::SegmentReplace);
    }

    for segment in &plan.timeline {
        let trims_source = segment.trim_start_ms > 0
            || segment
                .source_duration_ms
                .map_or(true, |duration| segment.trim_end_ms < duration);
        if trims_source {
            required.insert(Capability::Trim);
        }

        if segment.changes_speed() {
            required.insert(Capability::SpeedChange);
        }

        if !segment.filters.is_empty() {
            required.insert(Capability::AdvancedFilters);
        }

        if segment.transition_in.is_some() {
            required.insert(Capability::Transition);
        }

        // Unknown source geometry or container has to be assumed different.
        let source = plan.segment_source(segment);
        let same_size = source
            .and_then(|s| Some((s.width?, s.height?)))
            .is_some_and(|(w, h)| w == output.width && h == output.height);
        if !same_size {
            required.insert(Capability::Resize);
        }

        let source_container = source
            .and_then(|s| s.container)
            .or_else(|| plan.segment_asset(segment).and_then(Container::from_path));
        if source_container != Some(output.container) {
            required.insert(Capability::FormatConvert);
        }
    }

    let overlaps_base = plan
        .layer_segments()
        .any(|upper| plan.base_segments().any(|base| upper.overlaps(base)));
    if overlaps_base {
        required.insert(Capability::Overlay);
    }

    if !plan.audio_tracks.is_empty() {
        required.insert(Capability::AudioMux);
    }
    if plan.audio_tracks.iter().any(|t| t.has_fade()) {
        required.insert(Capability::AudioFade);
    }
    if plan
        .audio_tracks
        .iter()
        .any(|t| (t.speed_multiplier - 1.0).abs() > f64::EPSILON)
    {
        required.insert(Capability::SpeedChange);
    }

    if !plan.text_overlays.is_empty() {
        required.insert(Capability::TextOverlay);
    }

    required
}

//! Shared data models for the render gateway.
//!
//! This crate provides Serde-serializable types for:
//! - Execution plans and their validation
//! - Capabilities, engines and capability routing
//! - Jobs and their lifecycle
//! - The wire error taxonomy
//! - Simple transform requests

pub mod capability;
pub mod engine;
pub mod error;
pub mod job;
pub mod plan;
pub mod transform;
pub mod validation;

// Re-export common types
pub use capability::{required_capabilities, Capability, CapabilitySet};
pub use engine::{route, route_capabilities, EngineId, EngineRejection, RoutingDecision};
pub use error::{ApiErrorBody, ErrorCode, ModelError, ModelResult};
pub use job::{Job, JobArtifacts, JobId, JobStatus, RenderOutput};
pub use plan::{
    expected_output_duration_ms, AudioTrack, CodecHint, Container, ExecutionPlan, OutputFormat, PlanValidation,
    Quality, SourceRef, TextBackground, TextOverlay, TextPosition, TimelineSegment, Transition, TransitionKind,
    VideoFilter,
};
pub use transform::{AudioOptions, ResizeOptions, SourceInfo, TransformOptions, TrimOptions};
pub use validation::{overlay_syntax_issues, validate_plan, PlanIssue};

/// JSON schema describing an [`ExecutionPlan`].
pub fn plan_json_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ExecutionPlan)
}

//! Execution engines and capability routing.
//!
//! Engines are tried in priority order; the first whose declared
//! capabilities cover the plan wins. `plan_export` covers everything
//! (it renders nothing and hands the compiled command back), so routing
//! always terminates with a selection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capability::{required_capabilities, Capability, CapabilitySet};
use crate::plan::ExecutionPlan;

/// Execution engine identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    Webcodecs,
    Cloudinary,
    ServerFfmpeg,
    PlanExport,
}

impl EngineId {
    pub const ALL: [EngineId; 4] = [
        EngineId::Webcodecs,
        EngineId::Cloudinary,
        EngineId::ServerFfmpeg,
        EngineId::PlanExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineId::Webcodecs => "webcodecs",
            EngineId::Cloudinary => "cloudinary",
            EngineId::ServerFfmpeg => "server_ffmpeg",
            EngineId::PlanExport => "plan_export",
        }
    }

    /// Whether this engine declares `capability`.
    ///
    /// Every arm is exhaustive so a new capability has to be placed for each engine.
    pub fn supports(&self, capability: Capability) -> bool {
        use Capability::*;

        match self {
            EngineId::ServerFfmpeg | EngineId::PlanExport => true,
            EngineId::Webcodecs => match capability {
                Trim | Resize | FormatConvert | SegmentReplace | AudioMux => true,
                SpeedChange | AudioFade | AdvancedFilters | Overlay | Transition | TextOverlay => false,
            },
            EngineId::Cloudinary => match capability {
                Trim | SpeedChange | Resize | FormatConvert | Overlay | TextOverlay => true,
                SegmentReplace | AudioMux | AudioFade | AdvancedFilters | Transition => false,
            },
        }
    }

    /// Declared capability superset.
    pub fn capabilities(&self) -> CapabilitySet {
        Capability::ALL.into_iter().filter(|c| self.supports(*c)).collect()
    }

    /// Whether the gateway can execute this engine's output itself.
    pub fn has_server_executor(&self) -> bool {
        matches!(self, EngineId::ServerFfmpeg | EngineId::PlanExport)
    }

    /// Whether the engine produces a rendered file.
    pub fn renders(&self) -> bool {
        !matches!(self, EngineId::PlanExport)
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EngineId::ALL
            .into_iter()
            .find(|e| e.as_str() == s.trim())
            .ok_or_else(|| format!("unknown engine '{}'", s.trim()))
    }
}

/// An engine skipped during routing and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineRejection {
    pub engine: EngineId,
    pub missing: Vec<Capability>,
}

/// Outcome of routing a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub selected: EngineId,
    pub fallback_chain: Vec<EngineRejection>,
    pub required: Vec<Capability>,
}

/// Route a plan across `engines`, given in priority order.
pub fn route(plan: &ExecutionPlan, engines: &[EngineId]) -> RoutingDecision {
    route_capabilities(&required_capabilities(plan), engines)
}

/// Route a required capability set across `engines`, given in priority order.
///
/// `plan_export` is only considered after every other listed engine, and is
/// considered even when absent from the list.
pub fn route_capabilities(required: &CapabilitySet, engines: &[EngineId]) -> RoutingDecision {
    let mut fallback_chain: Vec<EngineRejection> = Vec::new();
    let mut tried: Vec<EngineId> = Vec::new();

    let candidates = engines.iter().copied().filter(|e| *e != EngineId::PlanExport);

    for engine in candidates {
        if tried.contains(&engine) {
            continue;
        }
        tried.push(engine);

        let missing: Vec<Capability> = required.iter().copied().filter(|c| !engine.supports(*c)).collect();
        if missing.is_empty() {
            return RoutingDecision {
                selected: engine,
                fallback_chain,
                required: required.iter().copied().collect(),
            };
        }
        fallback_chain.push(EngineRejection { engine, missing });
    }

    RoutingDecision {
        selected: EngineId::PlanExport,
        fallback_chain,
        required: required.iter().copied().collect(),
    }
}

//! Workflow depth presets and user overrides.
//!
//! Profiles are flat maps keyed by dotted names (`"features.research_phase"`,
//! `"scan.mapper_count"`) so that `config.json` can override a single knob:
//!
//! ```json
//! { "depth": "standard", "depth_profiles": { "standard": { "scan.mapper_count": 6 } } }
//! ```

use crate::config::PlanningConfig;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const DEPTH_QUICK: &str = "quick";
pub const DEPTH_STANDARD: &str = "standard";
pub const DEPTH_COMPREHENSIVE: &str = "comprehensive";
pub const DEFAULT_DEPTH: &str = DEPTH_STANDARD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthProfile {
    #[serde(rename = "features.research_phase")]
    pub research_phase: bool,
    #[serde(rename = "features.plan_checking")]
    pub plan_checking: bool,
    #[serde(rename = "features.goal_verification")]
    pub goal_verification: bool,
    #[serde(rename = "features.inline_verify")]
    pub inline_verify: bool,
    #[serde(rename = "scan.mapper_count")]
    pub mapper_count: u32,
    #[serde(rename = "scan.mapper_areas")]
    pub mapper_areas: Vec<String>,
    #[serde(rename = "debug.max_hypothesis_rounds")]
    pub max_hypothesis_rounds: u32,
    /// Override keys with no built-in meaning are carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDepth {
    /// The requested depth name, even when it fell back to standard values.
    pub depth: String,
    pub profile: DepthProfile,
}

fn areas(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Built-in preset for `name`, or `None` for an unknown depth.
pub fn preset(name: &str) -> Option<DepthProfile> {
    let profile = match name {
        DEPTH_QUICK => DepthProfile {
            research_phase: false,
            plan_checking: false,
            goal_verification: false,
            inline_verify: false,
            mapper_count: 2,
            mapper_areas: areas(&["tech", "arch"]),
            max_hypothesis_rounds: 3,
            extra: BTreeMap::new(),
        },
        DEPTH_STANDARD => standard_profile(),
        DEPTH_COMPREHENSIVE => DepthProfile {
            research_phase: true,
            plan_checking: true,
            goal_verification: true,
            inline_verify: true,
            mapper_count: 4,
            mapper_areas: areas(&["tech", "arch", "quality", "concerns"]),
            max_hypothesis_rounds: 10,
            extra: BTreeMap::new(),
        },
        _ => return None,
    };
    Some(profile)
}

/// Shallow-merge `config.depth_profiles[depth]` over the built-in preset for
/// `config.depth`. User keys win; an override whose value has the wrong type
/// for its key is skipped with a warning.
pub fn resolve_depth_profile(config: &PlanningConfig) -> ResolvedDepth {
    let depth = config.depth.clone();
    let base = preset(&depth).unwrap_or_else(standard_profile);

    let Some(Value::Object(overrides)) = config.depth_profiles.get(&depth) else {
        return ResolvedDepth {
            depth,
            profile: base,
        };
    };

    let mut merged = match serde_json::to_value(&base) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in overrides {
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value.clone());
        if serde_json::from_value::<DepthProfile>(Value::Object(candidate.clone())).is_ok() {
            merged = candidate;
        } else {
            warn!(depth = %depth, key = %key, "ignoring depth override with the wrong type");
        }
    }

    let profile = serde_json::from_value(Value::Object(merged)).unwrap_or(base);
    ResolvedDepth { depth, profile }
}

fn standard_profile() -> DepthProfile {
    DepthProfile {
        research_phase: true,
        plan_checking: true,
        goal_verification: true,
        inline_verify: false,
        mapper_count: 4,
        mapper_areas: areas(&["tech", "arch", "quality", "concerns"]),
        max_hypothesis_rounds: 5,
        extra: BTreeMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

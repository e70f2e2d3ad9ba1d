//! Allow / warn / block decisions for operation requests.
//!
//! A [`Gate`] is a plain function of a [`GateContext`]. The pipeline runs the
//! gates in priority order: role prerequisites first, then the cross-cutting
//! checks, then advisories. The first block wins; warnings from the gates that
//! ran are collected. Gates only read the filesystem.

pub mod advisory;
pub mod dependency;
pub mod exclusivity;
pub mod milestone;
pub mod prerequisite;

use crate::config::{PlanningConfig, Thresholds};
use crate::paths;
use crate::skill::{ActiveSkill, Skill};
use crate::state::StateDoc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// OperationRequest
// ---------------------------------------------------------------------------

/// One operation the host is about to perform, as delivered on the hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationRequest {
    #[serde(default, alias = "subagent_type")]
    pub role: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl OperationRequest {
    pub fn new(role: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            description: description.into(),
            extra: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Executor,
    Verifier,
    Planner,
    PlanChecker,
    Debugger,
    Researcher,
    Other(String),
}

impl Role {
    /// Decode a role name. A `namespace:` prefix is ignored.
    pub fn parse(s: &str) -> Self {
        let name = s.trim();
        let name = name.rsplit_once(':').map(|(_, n)| n).unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "executor" => Role::Executor,
            "verifier" => Role::Verifier,
            "planner" => Role::Planner,
            "plan-checker" | "plan_checker" => Role::PlanChecker,
            "debugger" => Role::Debugger,
            "researcher" => Role::Researcher,
            _ => Role::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Executor => "executor",
            Role::Verifier => "verifier",
            Role::Planner => "planner",
            Role::PlanChecker => "plan-checker",
            Role::Debugger => "debugger",
            Role::Researcher => "researcher",
            Role::Other(s) => s,
        }
    }

    /// Roles spawned by the managed workflows, as opposed to ad-hoc ones.
    pub fn is_workflow_role(&self) -> bool {
        !matches!(self, Role::Other(_))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateContext
// ---------------------------------------------------------------------------

/// Everything a gate may consult. Built once per request.
pub struct GateContext<'a> {
    pub root: &'a Path,
    pub request: &'a OperationRequest,
    pub role: Role,
    pub active_skill: Option<ActiveSkill>,
    pub now: DateTime<Utc>,
    pub thresholds: Thresholds,
}

impl<'a> GateContext<'a> {
    pub fn new(
        root: &'a Path,
        request: &'a OperationRequest,
        active_skill: Option<ActiveSkill>,
        now: DateTime<Utc>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            root,
            role: Role::parse(&request.role),
            request,
            active_skill,
            now,
            thresholds,
        }
    }

    /// Read the active-skill marker and thresholds from `root`. An unreadable
    /// marker is treated as absent.
    pub fn load(root: &'a Path, request: &'a OperationRequest, now: DateTime<Utc>) -> Self {
        let active_skill = ActiveSkill::read(root).unwrap_or_else(|e| {
            warn!(error = %e, "could not read active-skill marker");
            None
        });
        let thresholds = PlanningConfig::load_or_default(root).thresholds;
        Self::new(root, request, active_skill, now, thresholds)
    }

    pub fn skill(&self) -> Option<&Skill> {
        self.active_skill.as_ref().map(|a| &a.skill)
    }

    pub fn skill_is(&self, skill: &Skill) -> bool {
        self.skill() == Some(skill)
    }

    /// `current_phase` from `STATE.md`, or `None` when it cannot be determined.
    pub fn current_phase(&self) -> Option<u32> {
        match StateDoc::load(self.root) {
            Ok(state) => state?.current_phase,
            Err(e) => {
                debug!(error = %e, "state unreadable; gates treat phase as unknown");
                None
            }
        }
    }

    pub fn phase_dir(&self, number: u32) -> Option<PathBuf> {
        paths::find_phase_dir(self.root, number)
    }

    /// Path relative to the project root, for messages.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Allow,
    Warn(String),
    /// Denied. The reason names what is missing and the command that fixes it.
    Block(String),
}

/// A fn-pointer gate. `check` must not mutate anything on disk.
pub struct Gate {
    pub id: &'static str,
    pub check: fn(&GateContext) -> GateOutcome,
}

/// The built-in gates in evaluation order.
pub fn default_gates() -> Vec<Gate> {
    vec![
        Gate {
            id: "build-executor",
            check: prerequisite::build_executor,
        },
        Gate {
            id: "quick-executor",
            check: prerequisite::quick_executor,
        },
        Gate {
            id: "review-verifier",
            check: prerequisite::review_verifier,
        },
        Gate {
            id: "review-planner",
            check: prerequisite::review_planner,
        },
        Gate {
            id: "plan-exclusivity",
            check: exclusivity::plan_skill_executor,
        },
        Gate {
            id: "phase-dependencies",
            check: dependency::phase_dependencies,
        },
        Gate {
            id: "milestone-completion",
            check: milestone::milestone_completion,
        },
        Gate {
            id: "active-skill-integrity",
            check: advisory::active_skill_integrity,
        },
        Gate {
            id: "checkpoint-manifest",
            check: advisory::checkpoint_manifest,
        },
        Gate {
            id: "debug-output-dir",
            check: advisory::debug_output_dir,
        },
    ]
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Warn { warnings: Vec<String> },
    Block { gate: String, reason: String },
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Block { .. })
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Verdict::Warn { warnings } => warnings,
            _ => &[],
        }
    }

    /// Text for the host: the block reason, or all warnings joined into one
    /// advisory message. `None` for a silent allow.
    pub fn message(&self) -> Option<String> {
        match self {
            Verdict::Allow => None,
            Verdict::Warn { warnings } => Some(warnings.join("\n")),
            Verdict::Block { reason, .. } => Some(reason.clone()),
        }
    }

    /// The hook response record: nothing, `{warnings}` or `{blocked, reason}`.
    pub fn to_response(&self) -> Option<Value> {
        match self {
            Verdict::Allow => None,
            Verdict::Warn { warnings } => Some(json!({ "warnings": warnings })),
            Verdict::Block { gate, reason } => Some(json!({
                "blocked": true,
                "reason": reason,
                "gate": gate,
            })),
        }
    }
}

/// Serializes as the hook response record; a silent allow is `null`.
impl Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_response().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// GatePipeline
// ---------------------------------------------------------------------------

pub struct GatePipeline {
    gates: Vec<Gate>,
}

impl Default for GatePipeline {
    fn default() -> Self {
        Self::new(default_gates())
    }
}

impl GatePipeline {
    pub fn new(gates: Vec<Gate>) -> Self {
        Self { gates }
    }

    pub fn gate_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.gates.iter().map(|g| g.id)
    }

    pub fn evaluate(&self, ctx: &GateContext) -> Verdict {
        let mut warnings = Vec::new();
        for gate in &self.gates {
            match (gate.check)(ctx) {
                GateOutcome::Allow => {}
                GateOutcome::Warn(message) => {
                    debug!(gate = gate.id, "gate warned");
                    warnings.push(message);
                }
                GateOutcome::Block(reason) => {
                    debug!(gate = gate.id, role = %ctx.role, "gate blocked");
                    return Verdict::Block {
                        gate: gate.id.to_string(),
                        reason,
                    };
                }
            }
        }
        if warnings.is_empty() {
            Verdict::Allow
        } else {
            Verdict::Warn { warnings }
        }
    }
}

/// Evaluate `request` against the project at `root` with the built-in gates.
pub fn check_operation(root: &Path, request: &OperationRequest, now: DateTime<Utc>) -> Verdict {
    let ctx = GateContext::load(root, request, now);
    GatePipeline::default().evaluate(&ctx)
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;

    #[test]
    fn role_parsing() {
        assert_eq!(Role::parse("executor"), Role::Executor);
        assert_eq!(Role::parse("pbr:plan-checker"), Role::PlanChecker);
        assert_eq!(Role::parse("general-purpose"), Role::Other("general-purpose".into()));
        assert!(!Role::parse("general-purpose").is_workflow_role());
        assert!(Role::parse("ns:debugger").is_workflow_role());
    }

    #[test]
    fn request_decodes_host_shapes() {
        let req: OperationRequest =
            serde_json::from_str(r#"{"role":"executor","description":"Execute 02-01"}"#).unwrap();
        assert_eq!(req.role, "executor");
        assert!(req.extra.is_empty());

        let req: OperationRequest =
            serde_json::from_str(r#"{"subagent_type":"pbr:verifier","extra":{"phase":2}}"#)
                .unwrap();
        assert_eq!(Role::parse(&req.role), Role::Verifier);
        assert_eq!(req.description, "");
        assert_eq!(req.extra.get("phase"), Some(&Value::from(2)));
    }

    #[test]
    fn default_order() {
        let ids: Vec<_> = GatePipeline::default().gate_ids().collect();
        assert_eq!(
            ids,
            vec![
                "build-executor",
                "quick-executor",
                "review-verifier",
                "review-planner",
                "plan-exclusivity",
                "phase-dependencies",
                "milestone-completion",
                "active-skill-integrity",
                "checkpoint-manifest",
                "debug-output-dir",
            ]
        );
    }

    fn always_warn(_: &GateContext) -> GateOutcome {
        GateOutcome::Warn("first".into())
    }

    fn also_warn(_: &GateContext) -> GateOutcome {
        GateOutcome::Warn("second".into())
    }

    fn always_block(_: &GateContext) -> GateOutcome {
        GateOutcome::Block("stop".into())
    }

    fn never_reached(_: &GateContext) -> GateOutcome {
        panic!("pipeline kept going after a block")
    }

    #[test]
    fn first_block_short_circuits() {
        let project = Project::new();
        let req = OperationRequest::new("executor", "");
        let pipeline = GatePipeline::new(vec![
            Gate { id: "w", check: always_warn },
            Gate { id: "b", check: always_block },
            Gate { id: "x", check: never_reached },
        ]);
        let verdict = pipeline.evaluate(&ctx(&project, &req, None));
        assert_eq!(
            verdict,
            Verdict::Block {
                gate: "b".into(),
                reason: "stop".into()
            }
        );
    }

    #[test]
    fn warnings_accumulate() {
        let project = Project::new();
        let req = OperationRequest::new("executor", "");
        let pipeline = GatePipeline::new(vec![
            Gate { id: "a", check: always_warn },
            Gate { id: "b", check: also_warn },
        ]);
        let verdict = pipeline.evaluate(&ctx(&project, &req, None));
        assert_eq!(verdict.warnings(), &["first".to_string(), "second".to_string()]);
        assert_eq!(verdict.message().as_deref(), Some("first\nsecond"));
        assert_eq!(
            verdict.to_response(),
            Some(json!({ "warnings": ["first", "second"] }))
        );
    }

    #[test]
    fn silent_allow_has_no_response() {
        let project = Project::new();
        let req = OperationRequest::new("general-purpose", "");
        let verdict = GatePipeline::default().evaluate(&ctx(&project, &req, None));
        assert_eq!(verdict, Verdict::Allow);
        assert!(verdict.to_response().is_none());
    }

    #[test]
    fn block_response_shape() {
        let v = Verdict::Block {
            gate: "g".into(),
            reason: "r".into(),
        };
        assert_eq!(
            v.to_response(),
            Some(json!({ "blocked": true, "reason": "r", "gate": "g" }))
        );
        assert!(v.is_blocked());
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!({ "blocked": true, "reason": "r", "gate": "g" })
        );
        assert_eq!(serde_json::to_value(Verdict::Allow).unwrap(), Value::Null);
    }

    #[test]
    fn context_reads_marker_and_state() {
        let project = Project::new();
        project
            .write(".planning/.active-skill", "build\n")
            .current_phase(3);
        let req = OperationRequest::new("executor", "");
        let ctx = GateContext::load(project.root(), &req, now());
        assert!(ctx.skill_is(&Skill::Build));
        assert_eq!(ctx.current_phase(), Some(3));
        assert_eq!(ctx.role, Role::Executor);
    }

    #[test]
    fn build_without_plan_blocks_and_with_plan_allows() {
        let project = Project::new();
        project.current_phase(2).mkdir(".planning/phases/02-api");
        let req = OperationRequest::new("executor", "Execute plan 02-01");

        let verdict = GatePipeline::default().evaluate(&ctx(&project, &req, active(Skill::Build)));
        match &verdict {
            Verdict::Block { reason, .. } => assert!(reason.contains("PLAN"), "{reason}"),
            other => panic!("expected block, got {other:?}"),
        }

        project.write(
            ".planning/phases/02-api/02-01-PLAN.md",
            "---\nplan: 02-01\nwave: 1\n---\n\n# Tasks\n",
        );
        let verdict = GatePipeline::default().evaluate(&ctx(&project, &req, active(Skill::Build)));
        assert!(!verdict.is_blocked(), "{verdict:?}");
        assert!(verdict.warnings().iter().all(|w| !w.contains("PLAN")));
    }

    #[test]
    fn milestone_completion_names_unverified_phase() {
        let project = Project::new();
        project
            .current_phase(2)
            .write(
                ".planning/ROADMAP.md",
                "# Roadmap\n\n## Milestone v1.0: MVP\n\nPhases: 1-2\n",
            )
            .mkdir(".planning/phases/02-api")
            .verified("01-auth", "passed");
        let req = OperationRequest::new("general-purpose", "Complete milestone");

        let verdict =
            GatePipeline::default().evaluate(&ctx(&project, &req, active(Skill::Milestone)));
        match &verdict {
            Verdict::Block { gate, reason } => {
                assert_eq!(gate, "milestone-completion");
                assert!(reason.contains("phase 2"), "{reason}");
                assert!(!reason.contains("phase 1 "), "{reason}");
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn huge_staleness_threshold_does_not_abort_check() {
        let project = Project::new();
        project
            .write(".planning/.active-skill", "review\n")
            .write(
                ".planning/config.json",
                r#"{"thresholds":{"active_skill_stale_minutes":1000000000000000}}"#,
            );
        let req = OperationRequest::new("verifier", "Verify phase 1");
        let verdict = check_operation(project.root(), &req, now());
        assert!(!verdict.is_blocked(), "{verdict:?}");
        assert!(verdict.warnings().iter().all(|w| !w.starts_with("STALE")));
    }
}

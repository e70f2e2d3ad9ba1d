//! Non-blocking checks. Each returns at most one warning.

use super::{GateContext, GateOutcome, Role};
use crate::paths::{self, CHECKPOINT_MANIFEST};
use crate::skill::Skill;

/// Workflow roles spawned without a marker bypass every skill-keyed gate.
pub fn active_skill_integrity(ctx: &GateContext) -> GateOutcome {
    if !ctx.role.is_workflow_role() {
        return GateOutcome::Allow;
    }
    let Some(active) = &ctx.active_skill else {
        return GateOutcome::Warn(format!(
            "No .planning/.active-skill marker: workflow gates are disabled for this {} spawn. \
             Start the work through its skill (e.g. /build, /review) so the marker is written.",
            ctx.role
        ));
    };
    let threshold = ctx.thresholds.active_skill_staleness();
    if !active.is_stale(ctx.now, threshold) {
        return GateOutcome::Allow;
    }
    let minutes = active
        .age(ctx.now)
        .map(|age| age.num_minutes())
        .unwrap_or_default();
    GateOutcome::Warn(format!(
        "STALE .planning/.active-skill: '{}' was set {minutes} minutes ago (limit {} minutes). \
         A previous session probably crashed; delete the marker if no {} workflow is running.",
        active.skill,
        threshold.num_minutes(),
        active.skill
    ))
}

/// `build` writes a checkpoint manifest before spawning executors.
pub fn checkpoint_manifest(ctx: &GateContext) -> GateOutcome {
    if !ctx.skill_is(&Skill::Build) || ctx.role != Role::Executor {
        return GateOutcome::Allow;
    }
    let Some(dir) = ctx.current_phase().and_then(|n| ctx.phase_dir(n)) else {
        return GateOutcome::Allow;
    };
    let manifest = dir.join(CHECKPOINT_MANIFEST);
    if manifest.is_file() {
        return GateOutcome::Allow;
    }
    GateOutcome::Warn(format!(
        "{} not found; executor progress will not be resumable. \
         Let /build write the manifest before spawning executors.",
        ctx.display_path(&manifest)
    ))
}

/// Debug sessions record their findings under `.planning/debug/`.
pub fn debug_output_dir(ctx: &GateContext) -> GateOutcome {
    if !ctx.skill_is(&Skill::Debug) || ctx.role != Role::Debugger {
        return GateOutcome::Allow;
    }
    if paths::debug_dir(ctx.root).is_dir() {
        return GateOutcome::Allow;
    }
    GateOutcome::Warn(format!(
        "{}/ does not exist; the debugger has nowhere to record its session. Create it before spawning.",
        paths::DEBUG_DIR
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::gate::fixture::*;
    use crate::gate::OperationRequest;
    use crate::skill::ActiveSkill;
    use chrono::Duration;

    fn warned(outcome: GateOutcome) -> String {
        match outcome {
            GateOutcome::Warn(message) => message,
            other => panic!("expected warning, got {other:?}"),
        }
    }

    #[test]
    fn missing_marker_warns_for_workflow_roles_only() {
        let project = Project::new();
        let req = OperationRequest::new("executor", "");
        let message = warned(active_skill_integrity(&ctx(&project, &req, None)));
        assert!(message.contains(".active-skill"));
        assert!(message.contains("executor"));

        let req = OperationRequest::new("general-purpose", "");
        assert_eq!(active_skill_integrity(&ctx(&project, &req, None)), GateOutcome::Allow);
    }

    #[test]
    fn old_marker_escalates() {
        let project = Project::new();
        let req = OperationRequest::new("verifier", "");
        let old = Some(ActiveSkill::new(
            Skill::Review,
            Some(now() - Duration::minutes(180)),
        ));
        let message = warned(active_skill_integrity(&ctx(&project, &req, old)));
        assert!(message.starts_with("STALE"));
        assert!(message.contains("'review'"));
        assert!(message.contains("limit 120 minutes"));

        assert_eq!(
            active_skill_integrity(&ctx(&project, &req, active(Skill::Review))),
            GateOutcome::Allow
        );
    }

    #[test]
    fn staleness_threshold_is_configurable() {
        let project = Project::new();
        let req = OperationRequest::new("verifier", "");
        let marker = Some(ActiveSkill::new(
            Skill::Review,
            Some(now() - Duration::minutes(30)),
        ));
        let thresholds = Thresholds {
            active_skill_stale_minutes: 15,
            ..Thresholds::default()
        };
        let ctx = crate::gate::GateContext::new(project.root(), &req, marker, now(), thresholds);
        assert!(warned(active_skill_integrity(&ctx)).contains("limit 15 minutes"));
    }

    #[test]
    fn manifest_warning() {
        let project = Project::new();
        project
            .current_phase(2)
            .write(".planning/phases/02-api/02-01-PLAN.md", "# plan\n");
        let req = OperationRequest::new("executor", "");
        let message = warned(checkpoint_manifest(&ctx(&project, &req, active(Skill::Build))));
        assert!(message.contains(".checkpoint-manifest.json"));

        project.write(".planning/phases/02-api/.checkpoint-manifest.json", "{}");
        assert_eq!(
            checkpoint_manifest(&ctx(&project, &req, active(Skill::Build))),
            GateOutcome::Allow
        );
    }

    #[test]
    fn debug_dir_warning() {
        let project = Project::new();
        let req = OperationRequest::new("debugger", "");
        let message = warned(debug_output_dir(&ctx(&project, &req, active(Skill::Debug))));
        assert!(message.contains(".planning/debug/"));

        project.mkdir(".planning/debug");
        assert_eq!(
            debug_output_dir(&ctx(&project, &req, active(Skill::Debug))),
            GateOutcome::Allow
        );
    }
}

use super::{GateContext, GateOutcome, Role};
use crate::phase;
use crate::roadmap::Roadmap;
use crate::skill::Skill;
use tracing::debug;

/// Building a phase requires every phase it depends on to have been verified.
pub fn phase_dependencies(ctx: &GateContext) -> GateOutcome {
    if !ctx.skill_is(&Skill::Build) || ctx.role != Role::Executor {
        return GateOutcome::Allow;
    }
    let Some(number) = ctx.current_phase() else {
        return GateOutcome::Allow;
    };
    let roadmap = match Roadmap::load(ctx.root) {
        Ok(Some(r)) => r,
        Ok(None) => return GateOutcome::Allow,
        Err(e) => {
            debug!(error = %e, "roadmap unreadable; skipping dependency check");
            return GateOutcome::Allow;
        }
    };

    let unverified: Vec<u32> = roadmap
        .dependencies_of(number)
        .iter()
        .copied()
        .filter(|dep| {
            ctx.phase_dir(*dep)
                .and_then(|dir| phase::verification_path(&dir))
                .is_none()
        })
        .collect();
    if unverified.is_empty() {
        return GateOutcome::Allow;
    }

    let listed = unverified
        .iter()
        .map(|n| format!("phase {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    GateOutcome::Block(format!(
        "Cannot build phase {number}: it depends on {listed}, which has no VERIFICATION.md yet. \
         Run /review {} before building phase {number}.",
        unverified[0]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::fixture::*;
    use crate::gate::OperationRequest;

    const ROADMAP: &str = "## Phase Details\n\n### Phase 01: Auth\nDepends on: None\n\n### Phase 02: API\n\n### Phase 03: UI\n**Depends on:** Phase 1, Phase 2\n";

    #[test]
    fn blocks_on_unverified_dependency() {
        let project = Project::new();
        project
            .current_phase(3)
            .write(".planning/ROADMAP.md", ROADMAP)
            .verified("01-auth", "passed")
            .mkdir(".planning/phases/02-api");
        let req = OperationRequest::new("executor", "");
        match phase_dependencies(&ctx(&project, &req, active(Skill::Build))) {
            GateOutcome::Block(reason) => {
                assert!(reason.contains("phase 2"), "{reason}");
                assert!(!reason.contains("phase 1,"), "{reason}");
                assert!(reason.contains("/review 2"), "{reason}");
            }
            other => panic!("expected block, got {other:?}"),
        }

        project.verified("02-api", "gaps_found");
        assert_eq!(
            phase_dependencies(&ctx(&project, &req, active(Skill::Build))),
            GateOutcome::Allow
        );
    }

    #[test]
    fn no_declared_dependencies_allows() {
        let project = Project::new();
        project.current_phase(1).write(".planning/ROADMAP.md", ROADMAP);
        let req = OperationRequest::new("executor", "");
        assert_eq!(
            phase_dependencies(&ctx(&project, &req, active(Skill::Build))),
            GateOutcome::Allow
        );
    }

    #[test]
    fn missing_roadmap_allows() {
        let project = Project::new();
        project.current_phase(3);
        let req = OperationRequest::new("executor", "");
        assert_eq!(
            phase_dependencies(&ctx(&project, &req, active(Skill::Build))),
            GateOutcome::Allow
        );
    }
}

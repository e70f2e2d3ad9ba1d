use super::{GateContext, GateOutcome};
use crate::phase;
use crate::plan::VerificationStatus;
use crate::roadmap::Roadmap;
use crate::skill::Skill;
use tracing::debug;

fn requests_completion(description: &str) -> bool {
    description.to_ascii_lowercase().contains("complete")
}

/// Completing a milestone requires every phase in it to be verified without gaps.
pub fn milestone_completion(ctx: &GateContext) -> GateOutcome {
    if !ctx.skill_is(&Skill::Milestone) || !requests_completion(&ctx.request.description) {
        return GateOutcome::Allow;
    }
    let Some(current) = ctx.current_phase() else {
        return GateOutcome::Allow;
    };
    let roadmap = match Roadmap::load(ctx.root) {
        Ok(Some(r)) => r,
        Ok(None) => return GateOutcome::Allow,
        Err(e) => {
            debug!(error = %e, "roadmap unreadable; skipping milestone check");
            return GateOutcome::Allow;
        }
    };
    let Some(milestone) = roadmap.milestone_containing(current) else {
        return GateOutcome::Allow;
    };

    let mut problems = Vec::new();
    let mut first_unfinished = None;
    for &number in &milestone.phases {
        let status = ctx.phase_dir(number).and_then(|dir| phase::read_verification(&dir));
        let problem = match status {
            None => Some(format!("phase {number} has no VERIFICATION.md")),
            Some(VerificationStatus::GapsFound) => {
                Some(format!("phase {number} has verification gaps (gaps_found)"))
            }
            Some(_) => None,
        };
        if let Some(problem) = problem {
            first_unfinished.get_or_insert(number);
            problems.push(problem);
        }
    }
    let Some(first) = first_unfinished else {
        return GateOutcome::Allow;
    };
    GateOutcome::Block(format!(
        "Cannot complete {}: {}. Run /review {first} (and for every other listed phase) \
         before completing the milestone.",
        milestone.name,
        problems.join("; ")
    ))
}

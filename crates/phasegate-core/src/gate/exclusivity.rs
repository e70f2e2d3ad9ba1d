use super::{GateContext, GateOutcome, Role};
use crate::skill::Skill;

/// Planning never executes. Unconditional once the `plan` skill is active.
pub fn plan_skill_executor(ctx: &GateContext) -> GateOutcome {
    if !ctx.skill_is(&Skill::Plan) || ctx.role != Role::Executor {
        return GateOutcome::Allow;
    }
    let next = match ctx.current_phase() {
        Some(n) => format!("/build {n}"),
        None => "/build".to_string(),
    };
    GateOutcome::Block(format!(
        "Cannot spawn executor from the plan skill: planning only writes PLAN.md files. \
         Finish planning, then run {next} to execute the plans."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::fixture::*;
    use crate::gate::OperationRequest;

    #[test]
    fn plan_skill_cannot_execute() {
        let project = Project::new();
        project.current_phase(3);
        let req = OperationRequest::new("pbr:executor", "");
        match plan_skill_executor(&ctx(&project, &req, active(Skill::Plan))) {
            GateOutcome::Block(reason) => assert!(reason.contains("/build 3"), "{reason}"),
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn plan_skill_may_spawn_planners() {
        let project = Project::new();
        let req = OperationRequest::new("planner", "");
        assert_eq!(
            plan_skill_executor(&ctx(&project, &req, active(Skill::Plan))),
            GateOutcome::Allow
        );
        let req = OperationRequest::new("executor", "");
        assert_eq!(
            plan_skill_executor(&ctx(&project, &req, active(Skill::Build))),
            GateOutcome::Allow
        );
    }
}

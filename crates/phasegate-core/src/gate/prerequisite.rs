//! Role prerequisites: each gate applies to one (skill, role) pair and checks
//! that the artifact the role consumes already exists.

use super::{GateContext, GateOutcome, Role};
use crate::paths::{self, QUICK_PLAN_FILE};
use crate::phase::{self, PhaseInventory};
use crate::skill::Skill;
use std::path::{Path, PathBuf};
use tracing::debug;

fn applies(ctx: &GateContext, skill: Skill, role: Role) -> bool {
    ctx.skill_is(&skill) && ctx.role == role
}

/// Current phase and its directory, if state names a phase at all.
fn current_phase(ctx: &GateContext) -> Option<(u32, Option<PathBuf>)> {
    let number = ctx.current_phase()?;
    Some((number, ctx.phase_dir(number)))
}

fn scan(dir: &Path) -> Option<PhaseInventory> {
    match PhaseInventory::scan(dir) {
        Ok(inv) => Some(inv),
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "phase scan failed");
            None
        }
    }
}

/// `build` may only spawn an executor once the current phase has a non-empty plan.
pub fn build_executor(ctx: &GateContext) -> GateOutcome {
    if !applies(ctx, Skill::Build, Role::Executor) {
        return GateOutcome::Allow;
    }
    let Some((number, dir)) = current_phase(ctx) else {
        return GateOutcome::Allow;
    };
    let Some(dir) = dir else {
        return GateOutcome::Block(format!(
            "Cannot spawn executor: phase {number} has no directory under .planning/phases/, \
             so there is no PLAN.md to execute. Run /plan {number} first."
        ));
    };
    let Some(inventory) = scan(&dir) else {
        return GateOutcome::Allow;
    };
    if inventory.has_nonempty_plan() {
        return GateOutcome::Allow;
    }
    GateOutcome::Block(format!(
        "Cannot spawn executor: {} contains no non-empty PLAN.md files. \
         Run /plan {number} to create plans before building.",
        ctx.display_path(&dir)
    ))
}

/// Highest-numbered `NNN-slug` task directory under `.planning/quick/`.
fn latest_quick_task(quick_dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(quick_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| {
            let n = paths::phase_number_from_dir_name(&e.file_name().to_string_lossy())?;
            Some((n, e.path()))
        })
        .max_by_key(|(n, _)| *n)
        .map(|(_, path)| path)
}

/// `quick` may only spawn an executor once the newest quick task has its plan.
pub fn quick_executor(ctx: &GateContext) -> GateOutcome {
    if !applies(ctx, Skill::Quick, Role::Executor) {
        return GateOutcome::Allow;
    }
    let Some(task) = latest_quick_task(&paths::quick_dir(ctx.root)) else {
        return GateOutcome::Block(
            "Cannot spawn executor: no quick task directory exists under .planning/quick/. \
             Run /quick to create the task and its PLAN.md first."
                .to_string(),
        );
    };
    let plan = task.join(QUICK_PLAN_FILE);
    let has_plan = std::fs::read_to_string(&plan)
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false);
    if has_plan {
        GateOutcome::Allow
    } else {
        GateOutcome::Block(format!(
            "Cannot spawn executor: {} is missing or empty. \
             Run /quick again so the planner writes the task PLAN.md.",
            ctx.display_path(&plan)
        ))
    }
}

/// `review` may only spawn a verifier once the phase has build summaries.
pub fn review_verifier(ctx: &GateContext) -> GateOutcome {
    if !applies(ctx, Skill::Review, Role::Verifier) {
        return GateOutcome::Allow;
    }
    let Some((number, dir)) = current_phase(ctx) else {
        return GateOutcome::Allow;
    };
    let has_summaries = match &dir {
        Some(dir) => match scan(dir) {
            Some(inv) => !inv.summaries.is_empty(),
            None => return GateOutcome::Allow,
        },
        None => false,
    };
    if has_summaries {
        return GateOutcome::Allow;
    }
    GateOutcome::Block(format!(
        "Cannot spawn verifier: phase {number} has no SUMMARY.md files, so nothing has been built \
         to verify. Run /build {number} first."
    ))
}

/// `review` may only spawn a (gap-closure) planner once a verification exists.
pub fn review_planner(ctx: &GateContext) -> GateOutcome {
    if !applies(ctx, Skill::Review, Role::Planner) {
        return GateOutcome::Allow;
    }
    let Some((number, dir)) = current_phase(ctx) else {
        return GateOutcome::Allow;
    };
    if dir.as_deref().and_then(phase::verification_path).is_some() {
        return GateOutcome::Allow;
    }
    GateOutcome::Block(format!(
        "Cannot spawn planner for gap closure: phase {number} has no VERIFICATION.md. \
         Run /review {number} so the verifier records the gaps first."
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

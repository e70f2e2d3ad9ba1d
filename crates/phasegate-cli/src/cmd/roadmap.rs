use crate::cmd::lock_options;
use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use phasegate_core::roadmap::{self, Roadmap};
use phasegate_core::state::FieldChange;
use std::path::Path;

#[derive(Subcommand)]
pub enum RoadmapSubcommand {
    /// Print the phase overview, dependencies and milestones
    Show,

    /// Set the Status cell of a phase row
    Status {
        /// Phase number (3, 03 and 003 are equivalent)
        phase: String,
        status: String,
    },

    /// Set the Plans cell of a phase row to completed/total
    Plans {
        phase: String,
        completed: u32,
        total: u32,
    },
}

pub fn run(root: &Path, subcmd: RoadmapSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RoadmapSubcommand::Show => show(root, json),
        RoadmapSubcommand::Status { phase, status } => {
            let change =
                roadmap::update_roadmap_status(root, &phase, &status, &lock_options(root))
                    .with_context(|| format!("failed to update status of phase {phase}"))?;
            report(&phase, &change, json)
        }
        RoadmapSubcommand::Plans {
            phase,
            completed,
            total,
        } => {
            let change =
                roadmap::update_roadmap_plans(root, &phase, completed, total, &lock_options(root))
                    .with_context(|| format!("failed to update plans of phase {phase}"))?;
            report(&phase, &change, json)
        }
    }
}

fn report(phase: &str, change: &FieldChange, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(change);
    }
    println!(
        "phase {phase} {}: {} -> {}",
        change.field,
        or_dash(change.old.as_deref()),
        change.new
    );
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let roadmap = Roadmap::load(root)
        .context("failed to load roadmap")?
        .context("no .planning/ROADMAP.md in this project")?;

    if json {
        return print_json(&roadmap);
    }

    if roadmap.phases.is_empty() {
        println!("No phases in the Phase Overview table.");
    } else {
        let rows = roadmap
            .phases
            .iter()
            .map(|p| {
                let plans = match (p.plans_complete, p.plans_total) {
                    (Some(done), Some(total)) => format!("{done}/{total}"),
                    (done, total) => format!("{}/{}", or_dash(done), or_dash(total)),
                };
                let deps = p
                    .number_value()
                    .map(|n| roadmap.dependencies_of(n))
                    .unwrap_or_default()
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                vec![
                    p.number.clone(),
                    p.name.clone(),
                    plans,
                    p.wave.clone(),
                    p.status.clone(),
                    if deps.is_empty() { "-".to_string() } else { deps },
                ]
            })
            .collect();
        print_table(&["PHASE", "NAME", "PLANS", "WAVE", "STATUS", "DEPENDS ON"], rows);
    }

    for m in &roadmap.milestones {
        let phases = m
            .phases
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        println!("\n{}: phases {}", m.name, if phases.is_empty() { "-" } else { phases.as_str() });
    }
    Ok(())
}

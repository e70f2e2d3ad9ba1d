use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use phasegate_core::phase::{self, PhaseInventory};
use phasegate_core::plan::{check_wave_order, Plan};
use serde::Serialize;
use std::path::Path;

#[derive(Subcommand)]
pub enum PhaseSubcommand {
    /// List every phase directory with its derived status
    List,

    /// Show plans, summaries and verification for one phase
    Show {
        /// Phase number
        number: u32,
    },
}

pub fn run(root: &Path, subcmd: PhaseSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PhaseSubcommand::List => list(root, json),
        PhaseSubcommand::Show { number } => show(root, number, json),
    }
}

#[derive(Serialize)]
struct PhaseSummary<'a> {
    number: u32,
    slug: &'a str,
    plans: usize,
    summaries: usize,
    completed: usize,
    verification: Option<String>,
    status: phase::PhaseStatus,
}

impl<'a> PhaseSummary<'a> {
    fn of(inv: &'a PhaseInventory) -> Self {
        Self {
            number: inv.number,
            slug: &inv.slug,
            plans: inv.plans.len(),
            summaries: inv.summaries.len(),
            completed: inv.completed_summary_count(),
            verification: inv.verification.as_ref().map(|v| v.to_string()),
            status: inv.status(),
        }
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let phases = phase::list_phases(root).context("failed to scan phases")?;
    let summaries: Vec<PhaseSummary> = phases.iter().map(PhaseSummary::of).collect();

    if json {
        return print_json(&summaries);
    }
    if summaries.is_empty() {
        println!("No phase directories under .planning/phases/.");
        return Ok(());
    }
    let rows = summaries
        .iter()
        .map(|s| {
            vec![
                format!("{:02}", s.number),
                s.slug.to_string(),
                s.plans.to_string(),
                format!("{}/{}", s.completed, s.summaries),
                or_dash(s.verification.as_deref()),
                s.status.to_string(),
            ]
        })
        .collect();
    print_table(
        &["PHASE", "SLUG", "PLANS", "SUMMARIES", "VERIFICATION", "STATUS"],
        rows,
    );
    Ok(())
}

fn show(root: &Path, number: u32, json: bool) -> anyhow::Result<()> {
    let inv = PhaseInventory::load(root, number)
        .with_context(|| format!("failed to load phase {number}"))?;
    let plans: Vec<Plan> = inv.plans.iter().map(|p| p.plan.clone()).collect();
    let wave_problems = check_wave_order(&plans);

    if json {
        #[derive(Serialize)]
        struct PhaseDetail<'a> {
            #[serde(flatten)]
            summary: PhaseSummary<'a>,
            plans: &'a [Plan],
            wave_problems: &'a [String],
        }
        return print_json(&PhaseDetail {
            summary: PhaseSummary::of(&inv),
            plans: &plans,
            wave_problems: &wave_problems,
        });
    }

    println!("Phase {:02} ({})", inv.number, inv.slug);
    println!("Status:        {}", inv.status());
    println!(
        "Verification:  {}",
        or_dash(inv.verification.as_ref().map(|v| v.to_string()))
    );
    println!(
        "Summaries:     {} ({} complete)",
        inv.summaries.len(),
        inv.completed_summary_count()
    );
    if plans.is_empty() {
        println!("Plans:         none");
    } else {
        println!();
        let rows = inv
            .plans
            .iter()
            .map(|p| {
                vec![
                    p.plan.id.clone(),
                    p.plan.wave.to_string(),
                    if p.plan.depends_on.is_empty() {
                        "-".to_string()
                    } else {
                        p.plan.depends_on.join(", ")
                    },
                    if p.plan.autonomous { "yes" } else { "no" }.to_string(),
                    if p.empty { "empty" } else { "" }.to_string(),
                ]
            })
            .collect();
        print_table(&["PLAN", "WAVE", "DEPENDS ON", "AUTONOMOUS", ""], rows);
    }
    for problem in &wave_problems {
        println!("warning: {problem}");
    }
    Ok(())
}

use crate::cmd::lock_options;
use crate::output::{or_dash, print_json};
use anyhow::Context;
use clap::Subcommand;
use phasegate_core::state::{self, StateDoc, StateField};
use std::path::Path;

#[derive(Subcommand)]
pub enum StateSubcommand {
    /// Print the decoded STATE.md
    Show,

    /// Set one field: current_phase, status, plans_complete or last_activity
    Set {
        field: String,
        /// New value; `now` stamps last_activity with the current time
        value: String,
    },
}

pub fn run(root: &Path, subcmd: StateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StateSubcommand::Show => show(root, json),
        StateSubcommand::Set { field, value } => set(root, &field, &value, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let doc = StateDoc::load(root)
        .context("failed to load state")?
        .context("no .planning/STATE.md in this project")?;

    if json {
        return print_json(&doc);
    }

    let phase = match (doc.current_phase, doc.total_phases) {
        (Some(n), Some(total)) => format!("{n} of {total}"),
        (Some(n), None) => n.to_string(),
        _ => "-".to_string(),
    };
    let plans = match (doc.plans_complete, doc.plans_total) {
        (Some(done), Some(total)) => format!("{done} of {total}"),
        (done, _) => or_dash(done),
    };
    println!("Phase:          {phase}");
    if let Some(name) = &doc.phase_name {
        println!("Name:           {name}");
    }
    println!("Status:         {}", or_dash(doc.status.as_deref()));
    println!("Plans:          {plans}");
    println!(
        "Progress:       {}",
        or_dash(doc.progress_percent.map(|p| format!("{p}%")))
    );
    println!("Last activity:  {}", or_dash(doc.last_activity.as_deref()));
    println!("Last command:   {}", or_dash(doc.last_command.as_deref()));
    if doc.blockers.is_empty() {
        println!("Blockers:       none");
    } else {
        println!("Blockers:");
        for b in &doc.blockers {
            println!("  - {b}");
        }
    }
    Ok(())
}

fn set(root: &Path, field: &str, value: &str, json: bool) -> anyhow::Result<()> {
    let field: StateField = field.parse()?;
    let change = state::update_state_field(
        root,
        field,
        value,
        chrono::Utc::now(),
        &lock_options(root),
    )
    .with_context(|| format!("failed to update {field}"))?;

    if json {
        print_json(&change)?;
    } else {
        println!(
            "{}: {} -> {}",
            change.field,
            or_dash(change.old.as_deref()),
            change.new
        );
    }
    Ok(())
}

use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use phasegate_core::config::{PlanningConfig, WarnLevel};
use phasegate_core::depth::resolve_depth_profile;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (defaults filled in)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Print the resolved depth profile
    Depth,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => print_json(&PlanningConfig::load_or_default(root)),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Depth => depth(root, json),
    }
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = PlanningConfig::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn depth(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = PlanningConfig::load_or_default(root);
    let resolved = resolve_depth_profile(&config);
    if json {
        return print_json(&resolved);
    }

    let p = &resolved.profile;
    let flag = |b: bool| if b { "on" } else { "off" };
    println!("Depth:                  {}", resolved.depth);
    println!("Research phase:         {}", flag(p.research_phase));
    println!("Plan checking:          {}", flag(p.plan_checking));
    println!("Goal verification:      {}", flag(p.goal_verification));
    println!("Inline verify:          {}", flag(p.inline_verify));
    println!(
        "Mappers:                {} ({})",
        p.mapper_count,
        p.mapper_areas.join(", ")
    );
    println!("Max hypothesis rounds:  {}", p.max_hypothesis_rounds);
    for (key, value) in &p.extra {
        println!("{key}: {value}");
    }
    Ok(())
}

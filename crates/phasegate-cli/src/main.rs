mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, phase::PhaseSubcommand, roadmap::RoadmapSubcommand,
    state::StateSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "phasegate",
    about = "Gate workflow operations on planning state and keep STATE.md and ROADMAP.md consistent",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .planning/)
    #[arg(long, global = true, env = "PHASEGATE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an operation request (JSON on stdin) against the gates.
    /// Exits 0 to allow, 2 to block.
    Check {
        /// Read the request from a file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Show or update STATE.md
    State {
        #[command(subcommand)]
        subcommand: StateSubcommand,
    },

    /// Show or update ROADMAP.md
    Roadmap {
        #[command(subcommand)]
        subcommand: RoadmapSubcommand,
    },

    /// Inspect phase directories
    Phase {
        #[command(subcommand)]
        subcommand: PhaseSubcommand,
    },

    /// Inspect and validate config.json
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    // stdout carries verdicts and JSON; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Check { input } => cmd::check::run(&root, input.as_deref(), cli.json),
        Commands::State { subcommand } => cmd::state::run(&root, subcommand, cli.json),
        Commands::Roadmap { subcommand } => cmd::roadmap::run(&root, subcommand, cli.json),
        Commands::Phase { subcommand } => cmd::phase::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        if let Some(blocked) = e.downcast_ref::<cmd::check::Blocked>() {
            std::process::exit(blocked.exit_code());
        }
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

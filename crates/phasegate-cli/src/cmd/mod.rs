pub mod check;
pub mod config;
pub mod phase;
pub mod roadmap;
pub mod state;

use phasegate_core::config::PlanningConfig;
use phasegate_core::io::LockOptions;
use std::path::Path;

/// Lock settings for lifecycle writes, taken from `config.json` thresholds.
pub(crate) fn lock_options(root: &Path) -> LockOptions {
    PlanningConfig::load_or_default(root).thresholds.lock_options()
}

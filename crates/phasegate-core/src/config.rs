use crate::depth;
use crate::error::{PlanningError, Result};
use crate::io::LockOptions;
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ParallelizationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelizationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_agents: u32,
    #[serde(default = "default_min_plans")]
    pub min_plans_for_parallel: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_min_plans() -> u32 {
    2
}

impl Default for ParallelizationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_concurrent_agents: default_max_concurrent(),
            min_plans_for_parallel: default_min_plans(),
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Timing constants that the engine would otherwise hard-code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// An active-skill marker older than this suggests a crashed session.
    #[serde(default = "default_skill_stale_minutes")]
    pub active_skill_stale_minutes: u64,
    #[serde(default = "default_lock_staleness_ms")]
    pub lock_staleness_ms: u64,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
}

fn default_skill_stale_minutes() -> u64 {
    120
}

fn default_lock_staleness_ms() -> u64 {
    5000
}

fn default_lock_retries() -> u32 {
    3
}

fn default_lock_retry_delay_ms() -> u64 {
    100
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            active_skill_stale_minutes: default_skill_stale_minutes(),
            lock_staleness_ms: default_lock_staleness_ms(),
            lock_retries: default_lock_retries(),
            lock_retry_delay_ms: default_lock_retry_delay_ms(),
        }
    }
}

impl Thresholds {
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            retries: self.lock_retries,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
            staleness: Duration::from_millis(self.lock_staleness_ms),
        }
    }

    /// Marker staleness limit. Values beyond chrono's range saturate.
    pub fn active_skill_staleness(&self) -> chrono::Duration {
        i64::try_from(self.active_skill_stale_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or(chrono::Duration::MAX)
    }
}

// ---------------------------------------------------------------------------
// PlanningConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    #[serde(default = "default_depth")]
    pub depth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default)]
    pub features: BTreeMap<String, Value>,
    #[serde(default)]
    pub models: BTreeMap<String, Value>,
    #[serde(default)]
    pub parallelization: ParallelizationConfig,
    #[serde(default)]
    pub gates: BTreeMap<String, Value>,
    #[serde(default)]
    pub safety: BTreeMap<String, Value>,
    /// Per-depth overrides keyed by dotted profile key (`"scan.mapper_count"`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub depth_profiles: BTreeMap<String, Value>,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Keys this engine does not interpret, kept so `show` reflects the file.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_depth() -> String {
    depth::DEFAULT_DEPTH.to_string()
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            mode: None,
            features: BTreeMap::new(),
            models: BTreeMap::new(),
            parallelization: ParallelizationConfig::default(),
            gates: BTreeMap::new(),
            safety: BTreeMap::new(),
            depth_profiles: BTreeMap::new(),
            thresholds: Thresholds::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl PlanningConfig {
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PlanningError::MissingDocument(path));
        }
        let data = std::fs::read_to_string(&path)?;
        Self::from_json(&data)
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing or malformed. Used on paths that must never fail on config.
    pub fn load_or_default(root: &Path) -> Self {
        match Self::load(root) {
            Ok(cfg) => cfg,
            Err(PlanningError::MissingDocument(_)) => Self::default(),
            Err(e) => {
                warn!(error = %e, "config.json unreadable; using defaults");
                Self::default()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if depth::preset(&self.depth).is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "unknown depth '{}'; standard profile values will be used",
                    self.depth
                ),
            });
        }

        for (name, overrides) in &self.depth_profiles {
            if depth::preset(name).is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("depth_profiles.{name} does not match a known depth"),
                });
            }
            if !overrides.is_object() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("depth_profiles.{name} must be an object"),
                });
            }
        }

        if self.parallelization.enabled && self.parallelization.max_concurrent_agents == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "parallelization.max_concurrent_agents is 0 while parallelization is enabled"
                    .to_string(),
            });
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("active_skill_stale_minutes", t.active_skill_stale_minutes),
            ("lock_staleness_ms", t.lock_staleness_ms),
            ("lock_retries", u64::from(t.lock_retries)),
        ] {
            if value == 0 {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("thresholds.{name} is 0"),
                });
            }
        }

        if i64::try_from(t.active_skill_stale_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .is_none()
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "thresholds.active_skill_stale_minutes ({}) is out of range; the marker never goes stale",
                    t.active_skill_stale_minutes
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ConfigCache
// ---------------------------------------------------------------------------

/// Parsed `config.json`, reloaded only when the file's mtime changes. Owned by
/// whoever hosts the engine; one cache per project root.
#[derive(Debug, Default)]
pub struct ConfigCache {
    path: Option<PathBuf>,
    mtime: Option<SystemTime>,
    config: Option<PlanningConfig>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, root: &Path) -> Result<&PlanningConfig> {
        let path = paths::config_path(root);
        let mtime = match std::fs::metadata(&path) {
            Ok(meta) => Some(meta.modified()?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let fresh = self.path.as_deref() == Some(path.as_path())
            && self.mtime == mtime
            && self.config.is_some();
        if !fresh {
            debug!(path = %path.display(), "loading config");
            let config = match mtime {
                Some(_) => PlanningConfig::from_json(&std::fs::read_to_string(&path)?)?,
                None => PlanningConfig::default(),
            };
            self.path = Some(path);
            self.mtime = mtime;
            self.config = Some(config);
        }
        Ok(self.config.get_or_insert_with(PlanningConfig::default))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use crate::error::Result;
use crate::paths;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Skill
// ---------------------------------------------------------------------------

/// The high-level workflow currently driving operation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Build,
    Review,
    Quick,
    Plan,
    Milestone,
    Debug,
    Other(String),
}

impl Skill {
    /// Decode a marker value. A `namespace:` prefix is ignored.
    pub fn parse(s: &str) -> Self {
        let name = s.trim();
        let name = name.rsplit_once(':').map(|(_, n)| n).unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "build" => Skill::Build,
            "review" => Skill::Review,
            "quick" => Skill::Quick,
            "plan" => Skill::Plan,
            "milestone" => Skill::Milestone,
            "debug" => Skill::Debug,
            _ => Skill::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Skill::Build => "build",
            Skill::Review => "review",
            Skill::Quick => "quick",
            Skill::Plan => "plan",
            Skill::Milestone => "milestone",
            Skill::Debug => "debug",
            Skill::Other(s) => s,
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActiveSkill
// ---------------------------------------------------------------------------

/// Contents and age of `.planning/.active-skill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSkill {
    pub skill: Skill,
    /// Modification time of the marker, when the filesystem reports one.
    pub modified: Option<DateTime<Utc>>,
}

impl ActiveSkill {
    pub fn new(skill: Skill, modified: Option<DateTime<Utc>>) -> Self {
        Self { skill, modified }
    }

    /// Read the marker. A missing or blank file means no skill is active.
    pub fn read(root: &Path) -> Result<Option<Self>> {
        let path = paths::active_skill_path(root);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(Some(Self::new(Skill::parse(first), modified)))
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.modified.map(|m| now.signed_duration_since(m))
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now).map(|age| age > threshold).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

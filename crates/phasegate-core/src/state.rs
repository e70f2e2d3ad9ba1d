//! `STATE.md`: where the workflow currently stands.
//!
//! Two on-disk shapes decode into the same [`StateDoc`]. The structured form
//! keeps fields in front matter:
//!
//! ```text
//! ---
//! current_phase: 2
//! status: building
//! blockers:
//!   - waiting on API keys
//! ---
//! ```
//!
//! The legacy form spells them out in the body (`Phase: 2 of 5 (Auth)`,
//! `Status: building`, a `## Blockers` list, ...). When both are present the
//! front matter wins field by field.

use crate::error::{PlanningError, Result};
use crate::frontmatter;
use crate::io::{self, LockOptions};
use crate::paths;
use crate::table;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

/// Status values accepted by [`update_state_field`].
pub const KNOWN_STATUSES: &[&str] = &[
    "not_started",
    "planning",
    "discussed",
    "planned",
    "building",
    "built",
    "verified",
    "needs_fixes",
    "reviewed",
    "blocked",
    "complete",
];

// ---------------------------------------------------------------------------
// StateDoc
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateDoc {
    pub current_phase: Option<u32>,
    pub total_phases: Option<u32>,
    pub phase_name: Option<String>,
    pub status: Option<String>,
    pub progress_percent: Option<u8>,
    pub plans_total: Option<u32>,
    pub plans_complete: Option<u32>,
    pub last_activity: Option<String>,
    pub last_command: Option<String>,
    pub blockers: Vec<String>,
}

impl StateDoc {
    pub fn parse(text: &str) -> Self {
        let mut doc = parse_legacy(frontmatter::body(text));
        let fm = frontmatter::parse(text);
        if fm.is_empty() {
            return doc;
        }

        let uint = |key: &str| fm.get_int(key).and_then(|n| u32::try_from(n).ok());
        if let Some(n) = uint("current_phase") {
            doc.current_phase = Some(n);
        }
        if let Some(n) = uint("total_phases") {
            doc.total_phases = Some(n);
        }
        if let Some(n) = uint("plans_total") {
            doc.plans_total = Some(n);
        }
        if let Some(n) = uint("plans_complete") {
            doc.plans_complete = Some(n);
        }
        if let Some(n) = fm.get_int("progress_percent") {
            doc.progress_percent = Some(n.clamp(0, 100) as u8);
        }
        for (key, slot) in [
            ("phase_name", &mut doc.phase_name),
            ("status", &mut doc.status),
            ("last_activity", &mut doc.last_activity),
            ("last_command", &mut doc.last_command),
        ] {
            if let Some(v) = fm.get_str(key) {
                *slot = Some(v);
            }
        }
        if fm.contains_key("blockers") {
            doc.blockers = fm
                .get_list("blockers")
                .into_iter()
                .filter(|b| !is_none_marker(b))
                .collect();
        }
        doc
    }

    /// Read `.planning/STATE.md`. A missing document means "no state yet".
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = paths::state_path(root);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(Self::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Current value of `field` as text, as a lifecycle command reports it.
    pub fn field_text(&self, field: StateField) -> Option<String> {
        match field {
            StateField::CurrentPhase => self.current_phase.map(|n| n.to_string()),
            StateField::Status => self.status.clone(),
            StateField::PlansComplete => self.plans_complete.map(|n| n.to_string()),
            StateField::LastActivity => self.last_activity.clone(),
        }
    }
}

fn is_none_marker(item: &str) -> bool {
    matches!(
        item.trim().trim_end_matches('.').to_ascii_lowercase().as_str(),
        "none" | "n/a" | ""
    )
}

static OF_RE: OnceLock<Regex> = OnceLock::new();
static PERCENT_RE: OnceLock<Regex> = OnceLock::new();

fn of_re() -> &'static Regex {
    OF_RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d+)\s+of\s+(\d+)(?:\s*\(([^)]*)\))?").unwrap()
    })
}

fn percent_re() -> &'static Regex {
    PERCENT_RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").unwrap())
}

/// Byte offset where the value of a `Label: value` line starts, tolerating
/// bold markers (`**Label:** value`). The label match ignores case.
fn labeled_value(line: &str, label: &str) -> Option<usize> {
    let stripped = line.trim_start().trim_start_matches('*');
    let head = stripped.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let after = stripped[label.len()..].strip_prefix(':')?;
    let value = after.trim_start_matches('*').trim_start();
    Some(line.len() - value.len())
}

fn value_of<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    labeled_value(line, label).map(|off| line[off..].trim_end())
}

fn parse_legacy(body: &str) -> StateDoc {
    let mut doc = StateDoc::default();
    let mut in_blockers = false;

    for raw in body.lines() {
        let line = raw.trim_end_matches('\r');
        let trimmed = line.trim_start();

        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim().to_ascii_lowercase();
            in_blockers = heading.starts_with("blockers");
            continue;
        }
        if in_blockers {
            if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                if !is_none_marker(item) {
                    doc.blockers.push(item.trim().to_string());
                }
            }
            continue;
        }

        if let Some(v) = value_of(line, "phase") {
            if let Some(caps) = of_re().captures(v) {
                doc.current_phase = caps[1].parse().ok();
                doc.total_phases = caps[2].parse().ok();
                doc.phase_name = caps.get(3).map(|m| m.as_str().trim().to_string());
            } else {
                doc.current_phase = leading_number(v);
            }
        } else if let Some(v) = value_of(line, "plan") {
            if let Some(caps) = of_re().captures(v) {
                doc.plans_complete = caps[1].parse().ok();
                doc.plans_total = caps[2].parse().ok();
            } else {
                doc.plans_complete = leading_number(v);
            }
        } else if let Some(v) = value_of(line, "status") {
            if !v.is_empty() {
                doc.status = Some(v.to_string());
            }
        } else if let Some(v) = value_of(line, "progress") {
            doc.progress_percent = percent_re()
                .captures(v)
                .and_then(|c| c[1].parse::<u8>().ok())
                .map(|p| p.min(100));
        } else if let Some(v) = value_of(line, "last activity") {
            if !v.is_empty() {
                doc.last_activity = Some(v.to_string());
            }
        } else if let Some(v) = value_of(line, "last command") {
            if !v.is_empty() {
                doc.last_command = Some(v.to_string());
            }
        }
    }
    doc
}

fn leading_number(v: &str) -> Option<u32> {
    let digits: String = v.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Field updates
// ---------------------------------------------------------------------------

/// Fields a lifecycle command may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    CurrentPhase,
    Status,
    PlansComplete,
    LastActivity,
}

impl StateField {
    pub fn key(self) -> &'static str {
        match self {
            StateField::CurrentPhase => "current_phase",
            StateField::Status => "status",
            StateField::PlansComplete => "plans_complete",
            StateField::LastActivity => "last_activity",
        }
    }

    /// Label of the matching line in the legacy body form.
    fn legacy_label(self) -> &'static str {
        match self {
            StateField::CurrentPhase => "phase",
            StateField::Status => "status",
            StateField::PlansComplete => "plan",
            StateField::LastActivity => "last activity",
        }
    }

    /// Legacy lines of the form `N of M ...` keep everything after the number.
    fn replaces_leading_number(self) -> bool {
        matches!(self, StateField::CurrentPhase | StateField::PlansComplete)
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StateField {
    type Err = PlanningError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "current_phase" => Ok(StateField::CurrentPhase),
            "status" => Ok(StateField::Status),
            "plans_complete" => Ok(StateField::PlansComplete),
            "last_activity" => Ok(StateField::LastActivity),
            other => Err(PlanningError::UnknownField(other.to_string())),
        }
    }
}

/// What a lifecycle update changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: String,
}

fn invalid(field: StateField, value: &str, reason: &str) -> PlanningError {
    PlanningError::InvalidValue {
        field: field.key().to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Check `value` for `field` and return its canonical text.
fn normalize_value(field: StateField, value: &str, now: DateTime<Utc>) -> Result<String> {
    let trimmed = value.trim();
    match field {
        StateField::CurrentPhase | StateField::PlansComplete => trimmed
            .parse::<u32>()
            .map(|n| n.to_string())
            .map_err(|_| invalid(field, value, "expected a non-negative integer")),
        StateField::Status => {
            let lower = trimmed.to_ascii_lowercase();
            if KNOWN_STATUSES.contains(&lower.as_str()) {
                Ok(lower)
            } else {
                Err(invalid(
                    field,
                    value,
                    &format!("expected one of {}", KNOWN_STATUSES.join(", ")),
                ))
            }
        }
        StateField::LastActivity => match trimmed {
            "" => Err(invalid(field, value, "must not be empty")),
            "now" => Ok(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
            other => Ok(other.to_string()),
        },
    }
}

fn front_matter_scalar(field: StateField, value: &str) -> String {
    match field {
        StateField::CurrentPhase | StateField::PlansComplete => value.to_string(),
        _ if value.contains(':') || value.contains('#') => format!("\"{value}\""),
        _ => value.to_string(),
    }
}

/// Rewrite the legacy body line for `field`, if the document has one.
fn rewrite_legacy_line(text: &str, field: StateField, value: &str) -> Option<String> {
    let body_start = match frontmatter::split(text) {
        Some((_, body)) => text[..text.len() - body.len()].split_inclusive('\n').count(),
        None => 0,
    };
    let (index, line, offset) = text
        .lines()
        .enumerate()
        .skip(body_start)
        .map(|(i, l)| (i, l.trim_end_matches('\r')))
        .find_map(|(i, l)| labeled_value(l, field.legacy_label()).map(|off| (i, l, off)))?;

    let current = &line[offset..];
    let tail = if field.replaces_leading_number() {
        current.trim_start_matches(|c: char| c.is_ascii_digit())
    } else {
        ""
    };
    let tail = if tail.len() == current.len() { "" } else { tail };
    let new_line = format!("{}{}{}", &line[..offset], value, tail);
    Some(table::replace_line(text, index, &new_line))
}

/// Pure transform behind [`update_state_field`].
///
/// Front-matter documents get the key rewritten (or inserted) and any legacy
/// body line kept in sync. Legacy-only documents get their body line
/// rewritten; when the line is missing a front-matter block carrying the
/// field is added at the top.
pub fn apply_field_update(
    content: &str,
    field: StateField,
    value: &str,
    now: DateTime<Utc>,
) -> Result<(String, FieldChange)> {
    let new = normalize_value(field, value, now)?;
    let old = StateDoc::parse(content).field_text(field);
    let scalar = front_matter_scalar(field, &new);

    let has_front_matter = frontmatter::split(content).is_some();
    let mut out = match frontmatter::set_scalar(content, field.key(), &scalar) {
        Some((text, _)) => text,
        None => content.to_string(),
    };
    match rewrite_legacy_line(&out, field, &new) {
        Some(text) => out = text,
        None if !has_front_matter => {
            out = format!("---\n{}: {}\n---\n{}", field.key(), scalar, content);
        }
        None => {}
    }

    Ok((
        out,
        FieldChange {
            field: field.key().to_string(),
            old,
            new,
        },
    ))
}

/// Set one field of `.planning/STATE.md` under the document lock.
pub fn update_state_field(
    root: &Path,
    field: StateField,
    value: &str,
    now: DateTime<Utc>,
    opts: &LockOptions,
) -> Result<FieldChange> {
    let path = paths::state_path(root);
    let (_, change) = io::locked_update_with(&path, opts, |content| {
        apply_field_update(content, field, value, now)
    })?;
    tracing::info!(field = %field, new = %change.new, "state updated");
    Ok(change)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! `ROADMAP.md`: the phase overview table, per-phase dependency declarations
//! and milestone groupings.
//!
//! ```text
//! ## Phase Overview
//! | Phase | Name | Goal | Plans | Wave | Status |
//! |-------|------|------|-------|------|--------|
//! | 01    | Auth | ...  | 2/2   | 1    | verified |
//!
//! ## Milestone v1.0: MVP
//! Phases: 1-3
//!
//! ## Phase Details
//! ### Phase 02: API
//! **Depends on:** Phase 1
//! ```

use crate::error::{PlanningError, Result};
use crate::io::{self, LockOptions};
use crate::paths;
use crate::state::FieldChange;
use crate::table::{self, Table};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

pub const OVERVIEW_HEADING: &str = "Phase Overview";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRow {
    /// The number exactly as written in the table (`"03"`).
    pub number: String,
    pub name: String,
    pub goal: String,
    pub plans_complete: Option<u32>,
    pub plans_total: Option<u32>,
    pub wave: String,
    pub status: String,
}

impl PhaseRow {
    pub fn number_value(&self) -> Option<u32> {
        parse_phase_number(&self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub name: String,
    pub phases: Vec<u32>,
}

impl Milestone {
    pub fn contains(&self, phase: u32) -> bool {
        self.phases.contains(&phase)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Roadmap {
    pub phases: Vec<PhaseRow>,
    pub dependencies: BTreeMap<u32, Vec<u32>>,
    pub milestones: Vec<Milestone>,
}

impl Roadmap {
    pub fn parse(text: &str) -> Self {
        let overview = table::parse_table(text, OVERVIEW_HEADING);
        Self {
            phases: phase_rows(&overview),
            dependencies: parse_dependencies(text),
            milestones: parse_milestones(text),
        }
    }

    /// Read `.planning/ROADMAP.md`. A missing document means "no roadmap yet".
    pub fn load(root: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(paths::roadmap_path(root)) {
            Ok(text) => Ok(Some(Self::parse(&text))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn phase(&self, number: u32) -> Option<&PhaseRow> {
        self.phases.iter().find(|p| p.number_value() == Some(number))
    }

    /// Phase numbers `number` declares it depends on. Empty when undeclared.
    pub fn dependencies_of(&self, number: u32) -> &[u32] {
        self.dependencies
            .get(&number)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn milestone_containing(&self, number: u32) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.contains(number))
    }
}

/// `"3"`, `"03"`, `"003"` and `"Phase 3"` all name phase 3.
pub fn parse_phase_number(text: &str) -> Option<u32> {
    number_re().find(text)?.as_str().parse().ok()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static PHASE_HEADING_RE: OnceLock<Regex> = OnceLock::new();
static RANGE_RE: OnceLock<Regex> = OnceLock::new();

fn number_re() -> &'static Regex {
    NUMBER_RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

fn phase_heading_re() -> &'static Regex {
    PHASE_HEADING_RE.get_or_init(|| Regex::new(r"(?i)^#{2,4}\s*phase\s+(\d+)\b").unwrap())
}

fn range_re() -> &'static Regex {
    RANGE_RE.get_or_init(|| Regex::new(r"(\d+)\s*(?:-|–|\.\.)\s*(\d+)|(\d+)").unwrap())
}

/// Column positions, located from the header row. Only the phase number has
/// a positional fallback.
struct Columns {
    number: usize,
    name: Option<usize>,
    goal: Option<usize>,
    plans: Option<usize>,
    wave: Option<usize>,
    status: Option<usize>,
}

impl Columns {
    fn locate(table: &Table) -> Self {
        let find = |names: &[&str]| names.iter().find_map(|n| table.column(n));
        Self {
            number: find(&["phase", "#", "number"]).unwrap_or(0),
            name: find(&["name", "title"]),
            goal: find(&["goal", "description"]),
            plans: find(&["plans"]),
            wave: find(&["wave"]),
            status: find(&["status"]),
        }
    }

    fn require(column: Option<usize>, name: &str) -> Result<usize> {
        column.ok_or_else(|| PlanningError::Parse {
            document: paths::ROADMAP_FILE.to_string(),
            message: format!("overview table has no {name} column"),
        })
    }
}

fn cell(row: &table::Row, column: Option<usize>) -> &str {
    column.and_then(|i| row.cell(i)).unwrap_or_default()
}

fn phase_rows(table: &Table) -> Vec<PhaseRow> {
    let cols = Columns::locate(table);
    let text = |row: &table::Row, column: Option<usize>| cell(row, column).to_string();
    table
        .rows
        .iter()
        .filter(|row| row.cell(cols.number).and_then(parse_phase_number).is_some())
        .map(|row| {
            let (plans_complete, plans_total) = parse_plans(cell(row, cols.plans));
            PhaseRow {
                number: text(row, Some(cols.number)),
                name: text(row, cols.name),
                goal: text(row, cols.goal),
                plans_complete,
                plans_total,
                wave: text(row, cols.wave),
                status: text(row, cols.status),
            }
        })
        .collect()
}

fn parse_plans(cell: &str) -> (Option<u32>, Option<u32>) {
    match cell.split_once('/') {
        Some((done, total)) => (done.trim().parse().ok(), total.trim().parse().ok()),
        None => (None, cell.trim().parse().ok()),
    }
}

fn heading_level(line: &str) -> usize {
    line.chars().take_while(|c| *c == '#').count()
}

/// Value of a `Label: value` line, tolerating bold markers and list bullets.
fn labeled<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let stripped = line
        .trim_start()
        .trim_start_matches(['-', '*', ' ']);
    let head = stripped.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = stripped[label.len()..].trim_start_matches('*');
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim_start_matches('*').trim())
}

fn parse_dependencies(text: &str) -> BTreeMap<u32, Vec<u32>> {
    let mut deps = BTreeMap::new();
    let mut current: Option<u32> = None;

    for raw in text.lines() {
        let line = raw.trim_end();
        if line.starts_with('#') {
            current = phase_heading_re()
                .captures(line)
                .and_then(|c| c[1].parse().ok());
            continue;
        }
        let Some(phase) = current else {
            continue;
        };
        if let Some(value) = labeled(line, "depends on") {
            let list: Vec<u32> = if value.to_ascii_lowercase().starts_with("none") {
                Vec::new()
            } else {
                number_re()
                    .find_iter(value)
                    .filter_map(|m| m.as_str().parse().ok())
                    .collect()
            };
            deps.insert(phase, list);
        }
    }
    deps
}

/// Expand `1-3, 5` into `[1, 2, 3, 5]`.
fn parse_phase_set(value: &str) -> Vec<u32> {
    let mut out = Vec::new();
    for caps in range_re().captures_iter(value) {
        if let (Some(a), Some(b)) = (caps.get(1), caps.get(2)) {
            let (Ok(a), Ok(b)) = (a.as_str().parse::<u32>(), b.as_str().parse::<u32>()) else {
                continue;
            };
            out.extend(a.min(b)..=a.max(b));
        } else if let Some(n) = caps.get(3).and_then(|m| m.as_str().parse().ok()) {
            out.push(n);
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

fn parse_milestones(text: &str) -> Vec<Milestone> {
    let mut milestones = Vec::new();
    let mut current: Option<(Milestone, usize, bool)> = None;

    let finish = |slot: &mut Option<(Milestone, usize, bool)>, out: &mut Vec<Milestone>| {
        if let Some((mut m, _, _)) = slot.take() {
            m.phases.sort_unstable();
            m.phases.dedup();
            out.push(m);
        }
    };

    for raw in text.lines() {
        let line = raw.trim_end();
        if line.starts_with('#') {
            let level = heading_level(line);
            let title = line.trim_start_matches('#').trim();
            let closes = matches!(&current, Some((_, open_level, _)) if level <= *open_level);
            if closes {
                finish(&mut current, &mut milestones);
            }
            if title.to_ascii_lowercase().starts_with("milestone") {
                finish(&mut current, &mut milestones);
                current = Some((
                    Milestone {
                        name: title.to_string(),
                        phases: Vec::new(),
                    },
                    level,
                    false,
                ));
                continue;
            }
            if let Some((m, _, explicit)) = &mut current {
                if !*explicit {
                    if let Some(n) = phase_heading_re()
                        .captures(line)
                        .and_then(|c| c[1].parse().ok())
                    {
                        m.phases.push(n);
                    }
                }
            }
            continue;
        }
        if let Some((m, _, explicit)) = &mut current {
            if let Some(value) = labeled(line, "phases") {
                m.phases = parse_phase_set(value);
                *explicit = true;
            }
        }
    }
    finish(&mut current, &mut milestones);
    milestones
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

fn locate_row(content: &str, phase: &str) -> Result<(Table, usize)> {
    let wanted =
        parse_phase_number(phase).ok_or_else(|| PlanningError::PhaseNotFound(phase.to_string()))?;
    let table = table::parse_table(content, OVERVIEW_HEADING);
    let cols = Columns::locate(&table);
    let index = table
        .rows
        .iter()
        .position(|r| r.cell(cols.number).and_then(parse_phase_number) == Some(wanted))
        .ok_or_else(|| PlanningError::PhaseNotFound(phase.to_string()))?;
    Ok((table, index))
}

fn rewrite_cell(
    content: &str,
    table: &Table,
    index: usize,
    column: usize,
    value: &str,
) -> Result<String> {
    let row = &table.rows[index];
    let updated = table::update_table_cell(&row.raw, column, value).ok_or_else(|| {
        PlanningError::Parse {
            document: paths::ROADMAP_FILE.to_string(),
            message: format!("row on line {} has no column {}", row.line + 1, column + 1),
        }
    })?;
    Ok(table::replace_line(content, row.line, &updated))
}

/// Pure transform behind [`update_roadmap_status`].
pub fn apply_status_update(content: &str, phase: &str, status: &str) -> Result<(String, FieldChange)> {
    let status = status.trim();
    if status.is_empty() || status.contains('|') {
        return Err(PlanningError::InvalidValue {
            field: "status".into(),
            value: status.into(),
            reason: "must be non-empty and contain no '|'".into(),
        });
    }
    let (table, index) = locate_row(content, phase)?;
    let column = Columns::require(Columns::locate(&table).status, "Status")?;
    let old = table.rows[index].cell(column).map(str::to_string);
    let out = rewrite_cell(content, &table, index, column, status)?;
    Ok((
        out,
        FieldChange {
            field: "status".into(),
            old,
            new: status.to_string(),
        },
    ))
}

/// Pure transform behind [`update_roadmap_plans`].
pub fn apply_plans_update(
    content: &str,
    phase: &str,
    completed: u32,
    total: u32,
) -> Result<(String, FieldChange)> {
    if completed > total {
        return Err(PlanningError::InvalidValue {
            field: "plans".into(),
            value: format!("{completed}/{total}"),
            reason: "completed plans exceed the total".into(),
        });
    }
    let (table, index) = locate_row(content, phase)?;
    let column = Columns::require(Columns::locate(&table).plans, "Plans")?;
    let old = table.rows[index].cell(column).map(str::to_string);
    let new = format!("{completed}/{total}");
    let out = rewrite_cell(content, &table, index, column, &new)?;
    Ok((
        out,
        FieldChange {
            field: "plans".into(),
            old,
            new,
        },
    ))
}

pub fn update_roadmap_status(
    root: &Path,
    phase: &str,
    status: &str,
    opts: &LockOptions,
) -> Result<FieldChange> {
    let path = paths::roadmap_path(root);
    let (_, change) =
        io::locked_update_with(&path, opts, |content| apply_status_update(content, phase, status))?;
    tracing::info!(phase, new = %change.new, "roadmap status updated");
    Ok(change)
}

pub fn update_roadmap_plans(
    root: &Path,
    phase: &str,
    completed: u32,
    total: u32,
    opts: &LockOptions,
) -> Result<FieldChange> {
    let path = paths::roadmap_path(root);
    let (_, change) = io::locked_update_with(&path, opts, |content| {
        apply_plans_update(content, phase, completed, total)
    })?;
    tracing::info!(phase, new = %change.new, "roadmap plans updated");
    Ok(change)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

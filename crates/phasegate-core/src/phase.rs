use crate::error::{PlanningError, Result};
use crate::paths::{self, CONTEXT_FILE, VERIFICATION_FILE};
use crate::plan::{Plan, Summary, VerificationStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

// ---------------------------------------------------------------------------
// PhaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    Discussed,
    Planned,
    Building,
    Built,
    Verified,
    NeedsFixes,
    Reviewed,
}

impl PhaseStatus {
    pub fn all() -> &'static [PhaseStatus] {
        &[
            PhaseStatus::NotStarted,
            PhaseStatus::Discussed,
            PhaseStatus::Planned,
            PhaseStatus::Building,
            PhaseStatus::Built,
            PhaseStatus::Verified,
            PhaseStatus::NeedsFixes,
            PhaseStatus::Reviewed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "not_started",
            PhaseStatus::Discussed => "discussed",
            PhaseStatus::Planned => "planned",
            PhaseStatus::Building => "building",
            PhaseStatus::Built => "built",
            PhaseStatus::Verified => "verified",
            PhaseStatus::NeedsFixes => "needs_fixes",
            PhaseStatus::Reviewed => "reviewed",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = PlanningError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PhaseStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| PlanningError::InvalidValue {
                field: "phase status".to_string(),
                value: s.to_string(),
                reason: "not a known phase status".to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

/// The phase decision table. First matching row wins.
pub fn classify(
    plan_count: usize,
    completed_summary_count: usize,
    summary_count: usize,
    has_context: bool,
    verification: Option<&VerificationStatus>,
) -> PhaseStatus {
    if plan_count == 0 {
        return if has_context {
            PhaseStatus::Discussed
        } else {
            PhaseStatus::NotStarted
        };
    }
    if completed_summary_count == 0 && summary_count == 0 {
        return PhaseStatus::Planned;
    }
    if completed_summary_count < plan_count {
        return PhaseStatus::Building;
    }
    match verification {
        None => PhaseStatus::Built,
        Some(VerificationStatus::Passed) => PhaseStatus::Verified,
        Some(VerificationStatus::GapsFound) => PhaseStatus::NeedsFixes,
        Some(_) => PhaseStatus::Reviewed,
    }
}

/// Derive a phase's status from gathered counts, consulting `phase_dir` only
/// for the context artifact and the verification status.
pub fn derive_phase_status(
    plan_count: usize,
    completed_summary_count: usize,
    summary_count: usize,
    has_verification: bool,
    phase_dir: &Path,
) -> PhaseStatus {
    let has_context = phase_dir.join(CONTEXT_FILE).is_file();
    let verification = if has_verification {
        Some(read_verification(phase_dir).unwrap_or(VerificationStatus::Unknown))
    } else {
        None
    };
    classify(
        plan_count,
        completed_summary_count,
        summary_count,
        has_context,
        verification.as_ref(),
    )
}

// ---------------------------------------------------------------------------
// File classification
// ---------------------------------------------------------------------------

pub fn is_verification_file(name: &str) -> bool {
    name == VERIFICATION_FILE || name.ends_with("-VERIFICATION.md")
}

pub fn is_summary_file(name: &str) -> bool {
    name.ends_with(".md") && name.contains("SUMMARY")
}

pub fn is_plan_file(name: &str) -> bool {
    name.ends_with(".md")
        && name.contains("PLAN")
        && !is_summary_file(name)
        && !is_verification_file(name)
}

fn md_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    files.sort();
    Ok(files)
}

/// Path of the phase's verification document, if any.
pub fn verification_path(phase_dir: &Path) -> Option<PathBuf> {
    let direct = phase_dir.join(VERIFICATION_FILE);
    if direct.is_file() {
        return Some(direct);
    }
    md_files(phase_dir)
        .ok()?
        .into_iter()
        .find(|(name, _)| is_verification_file(name))
        .map(|(_, path)| path)
}

/// Unreadable or non-UTF-8 artifacts are left out of the inventory.
fn read_artifact(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unreadable phase artifact");
            None
        }
    }
}

/// Status of the phase's verification document; `None` when there is none.
pub fn read_verification(phase_dir: &Path) -> Option<VerificationStatus> {
    let path = verification_path(phase_dir)?;
    let text = std::fs::read_to_string(path).ok()?;
    Some(VerificationStatus::from_document(&text))
}

// ---------------------------------------------------------------------------
// PhaseInventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PlanFile {
    pub path: PathBuf,
    pub plan: Plan,
    /// True when the file holds nothing but whitespace.
    pub empty: bool,
}

/// Everything on disk for one `phases/NN-slug/` directory.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseInventory {
    pub number: u32,
    pub slug: String,
    pub dir: PathBuf,
    pub plans: Vec<PlanFile>,
    pub summaries: Vec<Summary>,
    pub verification: Option<VerificationStatus>,
    pub has_context: bool,
}

impl PhaseInventory {
    pub fn scan(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let number = paths::phase_number_from_dir_name(&name)
            .ok_or_else(|| PlanningError::PhaseNotFound(name.clone()))?;
        let slug = name
            .split_once('-')
            .map(|(_, s)| s.to_string())
            .unwrap_or_default();

        let mut plans = Vec::new();
        let mut summaries = Vec::new();
        let mut verification = None;
        for (file, path) in md_files(dir)? {
            if is_verification_file(&file) {
                let Some(text) = read_artifact(&path) else { continue };
                verification = Some(VerificationStatus::from_document(&text));
            } else if is_summary_file(&file) {
                let Some(text) = read_artifact(&path) else { continue };
                summaries.push(Summary::from_document(&text));
            } else if is_plan_file(&file) {
                let Some(text) = read_artifact(&path) else { continue };
                let stem = file.trim_end_matches(".md");
                plans.push(PlanFile {
                    plan: Plan::from_document(stem, &text),
                    empty: text.trim().is_empty(),
                    path,
                });
            }
        }

        Ok(Self {
            number,
            slug,
            dir: dir.to_path_buf(),
            plans,
            summaries,
            verification,
            has_context: dir.join(CONTEXT_FILE).is_file(),
        })
    }

    /// Scan `phases/NN-*/` for phase `number`.
    pub fn load(root: &Path, number: u32) -> Result<Self> {
        let dir = paths::find_phase_dir(root, number)
            .ok_or_else(|| PlanningError::PhaseNotFound(paths::phase_prefix(number)))?;
        Self::scan(&dir)
    }

    pub fn completed_summary_count(&self) -> usize {
        self.summaries.iter().filter(|s| s.is_complete()).count()
    }

    pub fn has_nonempty_plan(&self) -> bool {
        self.plans.iter().any(|p| !p.empty)
    }

    pub fn status(&self) -> PhaseStatus {
        classify(
            self.plans.len(),
            self.completed_summary_count(),
            self.summaries.len(),
            self.has_context,
            self.verification.as_ref(),
        )
    }
}

/// Every phase directory under `.planning/phases/`, ordered by number.
pub fn list_phases(root: &Path) -> Result<Vec<PhaseInventory>> {
    let dir = paths::phases_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut phases = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if paths::phase_number_from_dir_name(&name).is_none() {
            continue;
        }
        phases.push(PhaseInventory::scan(&entry.path())?);
    }
    phases.sort_by_key(|p| p.number);
    Ok(phases)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn phase_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(".planning/phases").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn decision_table_rows() {
        use PhaseStatus::*;
        let passed = VerificationStatus::Passed;
        let gaps = VerificationStatus::GapsFound;
        let other = VerificationStatus::Other("partial".into());
        assert_eq!(classify(0, 0, 0, true, None), Discussed);
        assert_eq!(classify(0, 0, 0, false, Some(&passed)), NotStarted);
        assert_eq!(classify(3, 0, 0, true, None), Planned);
        assert_eq!(classify(3, 0, 1, false, None), Building);
        assert_eq!(classify(3, 2, 2, false, Some(&passed)), Building);
        assert_eq!(classify(3, 3, 3, false, None), Built);
        assert_eq!(classify(3, 3, 3, false, Some(&passed)), Verified);
        assert_eq!(classify(3, 3, 3, false, Some(&gaps)), NeedsFixes);
        assert_eq!(classify(3, 3, 3, false, Some(&other)), Reviewed);
        assert_eq!(
            classify(3, 3, 3, false, Some(&VerificationStatus::Unknown)),
            Reviewed
        );
    }

    #[test]
    fn decision_table_is_total() {
        let verifications = [
            None,
            Some(VerificationStatus::Passed),
            Some(VerificationStatus::GapsFound),
            Some(VerificationStatus::HumanNeeded),
            Some(VerificationStatus::Unknown),
        ];
        for plans in 0..4 {
            for completed in 0..=plans {
                for summaries in completed..=plans + 1 {
                    for ctx in [false, true] {
                        for v in &verifications {
                            let status = classify(plans, completed, summaries, ctx, v.as_ref());
                            assert!(PhaseStatus::all().contains(&status));
                            let terminal = matches!(
                                status,
                                PhaseStatus::Verified | PhaseStatus::NeedsFixes | PhaseStatus::Reviewed
                            );
                            if terminal {
                                assert!(v.is_some() && plans > 0 && completed >= plans);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn derive_reads_context_and_verification() {
        let dir = TempDir::new().unwrap();
        let phase = phase_dir(dir.path(), "01-setup");
        assert_eq!(derive_phase_status(0, 0, 0, false, &phase), PhaseStatus::NotStarted);

        std::fs::write(phase.join("CONTEXT.md"), "decisions").unwrap();
        assert_eq!(derive_phase_status(0, 0, 0, false, &phase), PhaseStatus::Discussed);

        std::fs::write(phase.join("VERIFICATION.md"), "---\nstatus: gaps_found\n---\n").unwrap();
        assert_eq!(derive_phase_status(2, 2, 2, true, &phase), PhaseStatus::NeedsFixes);

        std::fs::write(phase.join("VERIFICATION.md"), "unparseable").unwrap();
        assert_eq!(derive_phase_status(2, 2, 2, true, &phase), PhaseStatus::Reviewed);
    }

    #[test]
    fn inventory_scan() {
        let dir = TempDir::new().unwrap();
        let phase = phase_dir(dir.path(), "02-auth");
        std::fs::write(phase.join("02-01-PLAN.md"), "---\nplan: 02-01\nwave: 1\n---\n").unwrap();
        std::fs::write(phase.join("02-02-PLAN.md"), "  \n").unwrap();
        std::fs::write(phase.join("02-01-SUMMARY.md"), "---\nstatus: complete\n---\n").unwrap();
        std::fs::write(phase.join("notes.md"), "scratch").unwrap();

        let inv = PhaseInventory::load(dir.path(), 2).unwrap();
        assert_eq!(inv.number, 2);
        assert_eq!(inv.slug, "auth");
        assert_eq!(inv.plans.len(), 2);
        assert_eq!(inv.plans[1].plan.id, "02-02-PLAN");
        assert!(inv.plans[1].empty);
        assert!(inv.has_nonempty_plan());
        assert_eq!(inv.completed_summary_count(), 1);
        assert_eq!(inv.status(), PhaseStatus::Building);
    }

    #[test]
    fn unreadable_artifacts_are_skipped() {
        let dir = TempDir::new().unwrap();
        let phase = phase_dir(dir.path(), "03-data");
        std::fs::write(phase.join("03-01-PLAN.md"), "# Load fixtures\n").unwrap();
        std::fs::write(phase.join("03-02-PLAN.md"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
        std::fs::write(phase.join("03-01-SUMMARY.md"), [0xc3, 0x28]).unwrap();

        let inv = PhaseInventory::load(dir.path(), 3).unwrap();
        assert_eq!(inv.plans.len(), 1);
        assert!(inv.summaries.is_empty());
        assert_eq!(inv.status(), PhaseStatus::Planned);
        assert_eq!(list_phases(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn list_phases_sorted() {
        let dir = TempDir::new().unwrap();
        phase_dir(dir.path(), "10-polish");
        phase_dir(dir.path(), "02-auth");
        phase_dir(dir.path(), "scratch");
        let phases = list_phases(dir.path()).unwrap();
        let numbers: Vec<u32> = phases.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![2, 10]);
    }

    #[test]
    fn missing_phase_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            PhaseInventory::load(dir.path(), 4),
            Err(PlanningError::PhaseNotFound(_))
        ));
    }

    #[test]
    fn file_classification() {
        assert!(is_plan_file("PLAN-01.md"));
        assert!(is_plan_file("03-02-PLAN.md"));
        assert!(!is_plan_file("03-02-SUMMARY.md"));
        assert!(is_summary_file("SUMMARY-01.md"));
        assert!(is_verification_file("VERIFICATION.md"));
        assert!(!is_plan_file("VERIFICATION.md"));
        assert!(!is_plan_file("PLAN.txt"));
    }
}

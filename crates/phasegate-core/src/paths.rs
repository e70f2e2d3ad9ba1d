use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLANNING_DIR: &str = ".planning";
pub const PHASES_DIR: &str = ".planning/phases";
pub const QUICK_DIR: &str = ".planning/quick";
pub const DEBUG_DIR: &str = ".planning/debug";

pub const STATE_FILE: &str = ".planning/STATE.md";
pub const ROADMAP_FILE: &str = ".planning/ROADMAP.md";
pub const CONFIG_FILE: &str = ".planning/config.json";
pub const ACTIVE_SKILL_FILE: &str = ".planning/.active-skill";

pub const VERIFICATION_FILE: &str = "VERIFICATION.md";
pub const CONTEXT_FILE: &str = "CONTEXT.md";
pub const QUICK_PLAN_FILE: &str = "PLAN.md";
pub const CHECKPOINT_MANIFEST: &str = ".checkpoint-manifest.json";

pub const LOCK_SUFFIX: &str = ".lock";
pub const TMP_SUFFIX: &str = ".tmp";
pub const BACKUP_SUFFIX: &str = ".bak";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn planning_dir(root: &Path) -> PathBuf {
    root.join(PLANNING_DIR)
}

pub fn phases_dir(root: &Path) -> PathBuf {
    root.join(PHASES_DIR)
}

pub fn quick_dir(root: &Path) -> PathBuf {
    root.join(QUICK_DIR)
}

pub fn debug_dir(root: &Path) -> PathBuf {
    root.join(DEBUG_DIR)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn roadmap_path(root: &Path) -> PathBuf {
    root.join(ROADMAP_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn active_skill_path(root: &Path) -> PathBuf {
    root.join(ACTIVE_SKILL_FILE)
}

/// `path` with `suffix` appended to the full file name (`STATE.md` → `STATE.md.lock`).
pub fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Two-digit directory prefix for a phase number (`3` → `"03"`).
pub fn phase_prefix(number: u32) -> String {
    format!("{number:02}")
}

/// Parse the leading number of a `NN-slug` directory name.
pub fn phase_number_from_dir_name(name: &str) -> Option<u32> {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = &name[digits.len()..];
    if !(rest.is_empty() || rest.starts_with('-')) {
        return None;
    }
    digits.parse().ok()
}

/// Locate `phases/NN-slug/` for `number`. Returns `None` when no directory matches.
pub fn find_phase_dir(root: &Path, number: u32) -> Option<PathBuf> {
    let entries = std::fs::read_dir(phases_dir(root)).ok()?;
    let mut matches: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            phase_number_from_dir_name(&e.file_name().to_string_lossy()) == Some(number)
        })
        .map(|e| e.path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            state_path(root),
            PathBuf::from("/tmp/proj/.planning/STATE.md")
        );
        assert_eq!(
            sidecar(&state_path(root), LOCK_SUFFIX),
            PathBuf::from("/tmp/proj/.planning/STATE.md.lock")
        );
    }

    #[test]
    fn phase_dir_names() {
        assert_eq!(phase_number_from_dir_name("03-auth"), Some(3));
        assert_eq!(phase_number_from_dir_name("12"), Some(12));
        assert_eq!(phase_number_from_dir_name("3a-auth"), None);
        assert_eq!(phase_number_from_dir_name("auth"), None);
        assert_eq!(phase_prefix(7), "07");
    }

    #[test]
    fn finds_phase_dir_by_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".planning/phases/01-setup")).unwrap();
        std::fs::create_dir_all(dir.path().join(".planning/phases/02-auth")).unwrap();
        let found = find_phase_dir(dir.path(), 2).unwrap();
        assert!(found.ends_with("02-auth"));
        assert!(find_phase_dir(dir.path(), 9).is_none());
    }
}

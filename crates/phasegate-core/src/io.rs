//! Locked read-modify-write for planning documents.
//!
//! Every mutation of `STATE.md` or `ROADMAP.md` goes through
//! [`locked_update`]: take the `<doc>.lock` sidecar, read, transform, write
//! via `<doc>.tmp` + rename, release. The lock is advisory; plain readers are
//! never blocked.

use crate::error::{PlanningError, Result};
use crate::paths::{self, BACKUP_SUFFIX, LOCK_SUFFIX, TMP_SUFFIX};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub const DEFAULT_LOCK_RETRIES: u32 = 3;
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_LOCK_STALENESS: Duration = Duration::from_millis(5000);

// ---------------------------------------------------------------------------
// LockOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Total acquisition attempts before giving up with `LockTimeout`.
    pub retries: u32,
    /// Base back-off; attempt `n` waits `retry_delay * n`.
    pub retry_delay: Duration,
    /// A lock whose mtime is older than this is treated as abandoned.
    pub staleness: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_LOCK_RETRIES,
            retry_delay: DEFAULT_LOCK_RETRY_DELAY,
            staleness: DEFAULT_LOCK_STALENESS,
        }
    }
}

// ---------------------------------------------------------------------------
// LockGuard
// ---------------------------------------------------------------------------

/// Ownership of a `<doc>.lock` sidecar. Dropping the guard removes the file.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Take the lock for `target`, reclaiming it if the current holder's lock
    /// is older than `opts.staleness`.
    pub fn acquire(target: &Path, opts: &LockOptions) -> Result<Self> {
        let lock_path = paths::sidecar(target, LOCK_SUFFIX);
        let retries = opts.retries.max(1);
        let mut attempt = 0u32;
        let mut reclaimed = 0u32;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    // The pid is informational; ownership is the file's existence.
                    let _ = write!(file, "{}", std::process::id());
                    debug!(lock = %lock_path.display(), "lock acquired");
                    return Ok(Self { path: lock_path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if reclaimed < retries && reclaim_if_stale(&lock_path, opts.staleness)? {
                        reclaimed += 1;
                        continue;
                    }
                    attempt += 1;
                    if attempt >= retries {
                        return Err(PlanningError::LockTimeout {
                            path: lock_path,
                            attempts: attempt,
                        });
                    }
                    std::thread::sleep(opts.retry_delay.saturating_mul(attempt));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(lock = %self.path.display(), error = %e, "failed to release lock"),
        }
    }
}

fn lock_age(path: &Path) -> std::io::Result<Duration> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO))
}

/// Remove `lock_path` if it is older than `staleness`. Returns true when the
/// caller should retry immediately (reclaimed, or the lock vanished meanwhile).
fn reclaim_if_stale(lock_path: &Path, staleness: Duration) -> Result<bool> {
    let age = match lock_age(lock_path) {
        Ok(age) => age,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    if age <= staleness {
        return Ok(false);
    }
    warn!(
        lock = %lock_path.display(),
        age_ms = age.as_millis() as u64,
        "reclaiming stale lock left by a crashed writer"
    );
    remove_if_still_stale(lock_path, staleness)
}

static ASIDE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Move the lock to a private name, then delete it only if the moved file is
/// still stale. Another caller may have reclaimed and re-created the lock
/// between our age check and the rename; in that case the fresh lock is
/// linked back into place. The link fails if a third writer has created the
/// lock in the meantime, which leaves a window narrower than the rename but
/// not closed.
fn remove_if_still_stale(lock_path: &Path, staleness: Duration) -> Result<bool> {
    let aside = paths::sidecar(
        lock_path,
        &format!(
            ".reclaim-{}-{}",
            std::process::id(),
            ASIDE_SEQ.fetch_add(1, Ordering::Relaxed)
        ),
    );
    match fs::rename(lock_path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }

    let still_stale = match lock_age(&aside) {
        Ok(age) => age > staleness,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    if still_stale {
        match fs::remove_file(&aside) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        return Ok(true);
    }

    debug!(lock = %lock_path.display(), "lock was re-taken during reclaim; restoring it");
    match fs::hard_link(&aside, lock_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            warn!(lock = %lock_path.display(), "lock re-created while restoring a live holder");
        }
        Err(e) => {
            // No hard links on this filesystem: move it back instead.
            fs::rename(&aside, lock_path)?;
            debug!(error = %e, "restored lock by rename");
            return Ok(false);
        }
    }
    let _ = fs::remove_file(&aside);
    Ok(false)
}

// ---------------------------------------------------------------------------
// Read / write
// ---------------------------------------------------------------------------

/// Read `path`, treating a missing file as empty.
pub fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

/// Write `data` to `path` via `path.tmp`, backing the old content up to
/// `path.bak` first and renaming the temp file over the original.
///
/// On failure the backup is restored (best effort) and the temp file is
/// always removed. A failed backup is logged and does not stop the write.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = paths::sidecar(path, TMP_SUFFIX);
    let bak = paths::sidecar(path, BACKUP_SUFFIX);
    let mut backed_up = false;

    let outcome = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        if path.exists() {
            match fs::copy(path, &bak) {
                Ok(_) => backed_up = true,
                Err(e) => warn!(path = %path.display(), error = %e, "backup before write failed"),
            }
        }
        fs::rename(&tmp, path)
    })();

    if let Err(source) = outcome {
        if backed_up {
            if let Err(e) = fs::copy(&bak, path) {
                warn!(path = %path.display(), error = %e, "restore from backup failed");
            }
        }
        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != ErrorKind::NotFound {
                warn!(tmp = %tmp.display(), error = %e, "failed to remove temp file");
            }
        }
        return Err(PlanningError::WriteFailure {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Lock `path`, feed its current content (empty if absent) through
/// `transform`, and write the result back atomically. Returns the new content.
///
/// An error from `transform` aborts the update and leaves the document as it
/// was. The lock is released on every path out of this function.
pub fn locked_update<F>(path: &Path, opts: &LockOptions, transform: F) -> Result<String>
where
    F: FnOnce(&str) -> Result<String>,
{
    locked_update_with(path, opts, |current| Ok((transform(current)?, ())))
        .map(|(content, ())| content)
}

/// Like [`locked_update`], but the transform also yields a value describing
/// what it changed, which is returned alongside the new content.
pub fn locked_update_with<F, T>(path: &Path, opts: &LockOptions, transform: F) -> Result<(String, T)>
where
    F: FnOnce(&str) -> Result<(String, T)>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let _guard = LockGuard::acquire(path, opts)?;
    let current = read_or_empty(path)?;
    let (updated, outcome) = transform(&current)?;
    atomic_write(path, updated.as_bytes())?;
    Ok((updated, outcome))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fast() -> LockOptions {
        LockOptions {
            retries: 2,
            retry_delay: Duration::from_millis(10),
            staleness: Duration::from_secs(60),
        }
    }

    #[test]
    fn creates_missing_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("STATE.md");
        let out = locked_update(&path, &fast(), |current| {
            assert!(current.is_empty());
            Ok("status: planning\n".to_string())
        })
        .unwrap();
        assert_eq!(out, "status: planning\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), out);
        assert!(!paths::sidecar(&path, LOCK_SUFFIX).exists());
        assert!(!paths::sidecar(&path, TMP_SUFFIX).exists());
    }

    #[test]
    fn backs_up_previous_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ROADMAP.md");
        fs::write(&path, "old").unwrap();
        locked_update(&path, &fast(), |c| Ok(format!("{c}+new"))).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old+new");
        assert_eq!(
            fs::read_to_string(paths::sidecar(&path, BACKUP_SUFFIX)).unwrap(),
            "old"
        );
    }

    #[test]
    fn transform_error_leaves_document_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("STATE.md");
        fs::write(&path, "keep me").unwrap();
        let err = locked_update(&path, &fast(), |_| {
            Err(PlanningError::UnknownField("bogus".into()))
        })
        .unwrap_err();
        assert!(matches!(err, PlanningError::UnknownField(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");
        assert!(!paths::sidecar(&path, LOCK_SUFFIX).exists());
    }

    #[test]
    fn live_lock_times_out_and_is_not_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("STATE.md");
        let lock = paths::sidecar(&path, LOCK_SUFFIX);
        fs::write(&lock, "99999").unwrap();

        let err = locked_update(&path, &fast(), |_| Ok("x".into())).unwrap_err();
        assert!(matches!(
            err,
            PlanningError::LockTimeout { attempts: 2, .. }
        ));
        assert!(lock.exists(), "a fresh lock must survive");
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("STATE.md");
        let lock = paths::sidecar(&path, LOCK_SUFFIX);
        fs::write(&lock, "99999").unwrap();
        let old = SystemTime::now() - Duration::from_secs(120);
        fs::File::options()
            .write(true)
            .open(&lock)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let opts = LockOptions {
            retries: 1,
            ..fast()
        };
        locked_update(&path, &opts, |_| Ok("reclaimed".into())).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "reclaimed");
        assert!(!lock.exists());
        assert!(fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .all(|e| !e.file_name().to_string_lossy().contains(".reclaim-")));
    }

    #[test]
    fn reclaim_restores_a_lock_that_turned_fresh() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("STATE.md.lock");
        fs::write(&lock, "4242").unwrap();

        // The lock looked stale a moment ago but has since been re-taken.
        assert!(!remove_if_still_stale(&lock, Duration::from_secs(60)).unwrap());
        assert_eq!(fs::read_to_string(&lock).unwrap(), "4242");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".reclaim-"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn reclaim_of_vanished_lock_retries() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("STATE.md.lock");
        assert!(remove_if_still_stale(&lock, Duration::from_secs(60)).unwrap());
        assert!(reclaim_if_stale(&lock, Duration::from_secs(60)).unwrap());
    }

    #[test]
    fn concurrent_updates_lose_nothing() {
        let dir = TempDir::new().unwrap();
        let path = Arc::new(dir.path().join("counter.md"));
        fs::write(&*path, "0").unwrap();
        let opts = LockOptions {
            retries: 500,
            retry_delay: Duration::from_millis(1),
            staleness: Duration::from_secs(60),
        };

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let path = Arc::clone(&path);
                std::thread::spawn(move || {
                    locked_update(&path, &opts, |c| {
                        let n: u64 = c.trim().parse().unwrap_or(0);
                        Ok((n + 1).to_string())
                    })
                    .unwrap();
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(fs::read_to_string(&*path).unwrap(), "8");
    }

    #[test]
    fn failed_rename_reports_write_failure_and_cleans_tmp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("occupied");
        fs::create_dir_all(path.join("child")).unwrap();
        let err = atomic_write(&path, b"data").unwrap_err();
        assert!(matches!(err, PlanningError::WriteFailure { .. }));
        assert!(!paths::sidecar(&path, TMP_SUFFIX).exists());
        assert!(path.is_dir());
    }
}

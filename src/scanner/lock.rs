//! Process-wide scan mutex backed by a marker file.
//!
//! The in-process flag serializes scans inside one server; the marker file
//! `{data_dir}/scan.lock`, created with `create_new`, carries the exclusion
//! across restarts. A marker left behind by a crashed process is only released
//! automatically when `scanner.stale_lock_secs` is set.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const LOCK_FILE: &str = "scan.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub started_at: DateTime<Utc>,
    pub pid: u32,
}

/// Result of an operator-initiated lock removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceRelease {
    Removed,
    NotPresent,
    /// This process is scanning right now; the lock is live.
    Busy,
}

#[derive(Debug)]
pub struct ScanLock {
    path: PathBuf,
    running: AtomicBool,
    stale_after: Option<chrono::Duration>,
}

impl ScanLock {
    pub fn new(data_dir: &Path, stale_lock_secs: Option<u64>) -> Self {
        Self {
            path: data_dir.join(LOCK_FILE),
            running: AtomicBool::new(false),
            stale_after: stale_lock_secs.map(|s| chrono::Duration::seconds(s as i64)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this process currently runs a scan.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Contents of the marker file, if one exists and is readable.
    pub fn info(&self) -> Option<LockInfo> {
        crate::store::read_json(&self.path)
    }

    pub fn marker_present(&self) -> bool {
        self.path.exists()
    }

    /// Takes the lock. `Ok(None)` means another scan holds it.
    pub fn try_acquire(self: &Arc<Self>) -> io::Result<Option<ScanLockGuard>> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Ok(None);
        }
        match self.create_marker() {
            Ok(true) => Ok(Some(ScanLockGuard { lock: Arc::clone(self) })),
            Ok(false) => {
                self.running.store(false, Ordering::Release);
                Ok(None)
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Removes a leftover marker. Refused while this process is scanning.
    ///
    /// The in-process flag is held while the marker is removed and while
    /// `on_cleared` runs, so no scan can start in between.
    pub fn force_release<F: FnOnce()>(&self, on_cleared: F) -> io::Result<ForceRelease> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Ok(ForceRelease::Busy);
        }
        let outcome = match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::warn!(path = %self.path.display(), "scan lock removed by operator");
                Ok(ForceRelease::Removed)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ForceRelease::NotPresent),
            Err(e) => Err(e),
        };
        if outcome.is_ok() {
            on_cleared();
        }
        self.running.store(false, Ordering::Release);
        outcome
    }

    fn create_marker(&self) -> io::Result<bool> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(mut f) => {
                    let info = LockInfo { started_at: Utc::now(), pid: std::process::id() };
                    let json = serde_json::to_vec(&info).map_err(io::Error::other)?;
                    f.write_all(&json)?;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !self.marker_is_stale() {
                        return Ok(false);
                    }
                    tracing::warn!(path = %self.path.display(), "releasing stale scan lock");
                    match std::fs::remove_file(&self.path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn marker_is_stale(&self) -> bool {
        let Some(ttl) = self.stale_after else {
            return false;
        };
        let started_at = match self.info() {
            Some(info) => info.started_at,
            // Unreadable marker: fall back to its modification time
            None => match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
                Ok(t) => DateTime::<Utc>::from(t),
                Err(_) => return false,
            },
        };
        Utc::now() - started_at > ttl
    }

    fn release(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(path = %self.path.display(), error = %e, "failed to remove scan lock"),
        }
        self.running.store(false, Ordering::Release);
    }
}

/// Held for the duration of one scan; dropping it releases the lock.
#[derive(Debug)]
pub struct ScanLockGuard {
    lock: Arc<ScanLock>,
}

impl Drop for ScanLockGuard {
    fn drop(&mut self) {
        self.lock.release();
    }
}

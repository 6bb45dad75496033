//! Removes thumbnails and cache entries that no longer belong to a media file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::codec::{PARTIAL_SUFFIX, THUMB_SUFFIX};
use crate::store::{DateCache, LocationCache};

/// What one reconciliation pass removed, per cache kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub thumbnails: u64,
    pub partials: u64,
    pub temp_files: u64,
    pub location_entries: u64,
    pub date_entries: u64,
}

impl ReconcileReport {
    pub fn total(&self) -> u64 {
        self.thumbnails + self.partials + self.temp_files + self.location_entries + self.date_entries
    }
}

pub struct CacheReconciler {
    thumb_dir: PathBuf,
    temp_dir: PathBuf,
    locations: Arc<LocationCache>,
    dates: Arc<DateCache>,
}

impl CacheReconciler {
    pub fn new(thumb_dir: PathBuf, temp_dir: PathBuf, locations: Arc<LocationCache>, dates: Arc<DateCache>) -> Self {
        Self { thumb_dir, temp_dir, locations, dates }
    }

    /// Deletes every artifact whose file id is not in `valid`.
    ///
    /// Runs to completion: failed deletions are logged and skipped. Must only be
    /// called while the scan lock is held, since leftover partial files of an
    /// interrupted run are removed as well.
    pub fn clean_orphans(&self, valid: &HashSet<String>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for (path, name) in list_files(&self.thumb_dir) {
            if let Some(file_id) = name.strip_suffix(THUMB_SUFFIX) {
                if !name.starts_with('.') && !valid.contains(file_id) && remove(&path) {
                    tracing::debug!(file_id = %file_id, "orphaned thumbnail deleted");
                    report.thumbnails += 1;
                }
            } else if name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) && remove(&path) {
                report.partials += 1;
            }
        }

        for (path, _) in list_files(&self.temp_dir) {
            if remove(&path) {
                report.temp_files += 1;
            }
        }

        match self.locations.prune(valid) {
            Ok(n) => report.location_entries = n as u64,
            Err(e) => tracing::warn!(error = %e, "failed to prune location cache"),
        }
        match self.dates.prune_missing() {
            Ok(n) => report.date_entries = n as u64,
            Err(e) => tracing::warn!(error = %e, "failed to prune date cache"),
        }

        if report.total() > 0 {
            tracing::info!(
                thumbnails = report.thumbnails,
                partials = report.partials,
                temp_files = report.temp_files,
                location_entries = report.location_entries,
                date_entries = report.date_entries,
                "orphans removed"
            );
        }
        report
    }
}

fn list_files(dir: &Path) -> Vec<(PathBuf, String)> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot list cache directory");
            return Vec::new();
        }
    };
    rd.filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| (e.path(), e.file_name().to_string_lossy().to_string()))
        .collect()
}

fn remove(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete cache file");
            false
        }
    }
}

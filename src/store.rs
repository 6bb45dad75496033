//! File-backed JSON stores for scan state and the auxiliary caches.
//!
//! Every write goes through [`atomic_write_json`] so concurrent readers never
//! observe a half-written document.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{de::DeserializeOwned, Serialize};

use crate::types::{FileLocation, ScanState};

pub const SCAN_STATE_FILE: &str = "scan-state.json";
pub const LOCATION_CACHE_FILE: &str = "file-cache.json";
pub const DATE_CACHE_FILE: &str = "date-cache.json";

/// Writes `value` as pretty JSON next to `path` and renames it into place.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let tmp = dir.join(format!(".{}.tmp", name));
    let mut json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    json.push(b'\n');
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

/// Reads a JSON document; missing or unparsable files yield `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read json document");
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt json document");
            None
        }
    }
}

/// Current scan state, mirrored to disk on every change.
#[derive(Debug)]
pub struct ScanStateStore {
    path: PathBuf,
    current: RwLock<Option<ScanState>>,
}

impl ScanStateStore {
    /// Loads the last persisted state, if any.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(SCAN_STATE_FILE);
        let current = read_json(&path);
        Self { path, current: RwLock::new(current) }
    }

    pub fn current(&self) -> Option<ScanState> {
        self.current.read().ok().and_then(|g| g.clone())
    }

    /// Updates the in-memory copy first, then persists. A failed write is logged;
    /// observers still see the new state.
    pub fn save(&self, state: &ScanState) {
        if let Ok(mut g) = self.current.write() {
            *g = Some(state.clone());
        }
        if let Err(e) = atomic_write_json(&self.path, state) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to persist scan state");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `fileId -> location` index rebuilt on every scan.
#[derive(Debug)]
pub struct LocationCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, FileLocation>>,
}

impl LocationCache {
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(LOCATION_CACHE_FILE);
        let entries = read_json(&path).unwrap_or_default();
        Self { path, entries: RwLock::new(entries) }
    }

    pub fn get(&self, file_id: &str) -> Option<FileLocation> {
        self.entries.read().ok()?.get(file_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces one entry and persists the cache.
    pub fn set(&self, file_id: String, location: FileLocation) -> io::Result<()> {
        let snapshot = {
            let mut g = self.entries.write().map_err(|_| poisoned())?;
            g.insert(file_id, location);
            g.clone()
        };
        atomic_write_json(&self.path, &snapshot)
    }

    /// Replaces the whole cache with `entries`.
    pub fn rebuild<I>(&self, entries: I) -> io::Result<()>
    where
        I: IntoIterator<Item = (String, FileLocation)>,
    {
        let fresh: HashMap<String, FileLocation> = entries.into_iter().collect();
        atomic_write_json(&self.path, &fresh)?;
        if let Ok(mut g) = self.entries.write() {
            *g = fresh;
        }
        Ok(())
    }

    /// Drops entries whose id is not in `valid` or whose file is gone.
    /// Returns the number of removed entries.
    pub fn prune(&self, valid: &HashSet<String>) -> io::Result<usize> {
        let (removed, snapshot) = {
            let mut g = self.entries.write().map_err(|_| poisoned())?;
            let before = g.len();
            g.retain(|id, loc| {
                let keep = valid.contains(id) && loc.file_path.exists();
                if !keep {
                    tracing::debug!(file_id = %id, path = %loc.file_path.display(), "dropping stale location entry");
                }
                keep
            });
            (before - g.len(), g.clone())
        };
        if removed > 0 {
            atomic_write_json(&self.path, &snapshot)?;
        }
        Ok(removed)
    }
}

/// Capture dates keyed by absolute media path.
#[derive(Debug)]
pub struct DateCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl DateCache {
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(DATE_CACHE_FILE);
        let entries = read_json(&path).unwrap_or_default();
        Self { path, entries: RwLock::new(entries) }
    }

    pub fn get(&self, media_path: &Path) -> Option<String> {
        self.entries.read().ok()?.get(media_path.to_string_lossy().as_ref()).cloned()
    }

    pub fn contains(&self, media_path: &Path) -> bool {
        self.entries.read().map(|g| g.contains_key(media_path.to_string_lossy().as_ref())).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds entries in memory; call [`DateCache::persist`] afterwards.
    pub fn extend<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (PathBuf, String)>,
    {
        if let Ok(mut g) = self.entries.write() {
            g.extend(entries.into_iter().map(|(p, d)| (p.to_string_lossy().to_string(), d)));
        }
    }

    pub fn persist(&self) -> io::Result<()> {
        let snapshot = self.entries.read().map_err(|_| poisoned())?.clone();
        atomic_write_json(&self.path, &snapshot)
    }

    /// Drops entries whose file no longer exists. Returns the number removed.
    pub fn prune_missing(&self) -> io::Result<usize> {
        let removed = {
            let mut g = self.entries.write().map_err(|_| poisoned())?;
            let before = g.len();
            g.retain(|p, _| Path::new(p).exists());
            before - g.len()
        };
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }
}

fn poisoned() -> io::Error {
    io::Error::other("cache lock poisoned")
}

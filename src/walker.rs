//! Recursive media enumeration below the configured roots.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::types::{MediaFile, MediaKind};

/// Directory suffix of macOS Photos libraries, never descended into.
pub const LIBRARY_BUNDLE_SUFFIX: &str = ".photoslibrary";

#[derive(Debug, Clone)]
pub struct MediaWalker {
    excludes: GlobSet,
    follow_symlinks: bool,
}

impl Default for MediaWalker {
    fn default() -> Self {
        Self { excludes: GlobSet::empty(), follow_symlinks: true }
    }
}

impl MediaWalker {
    pub fn new(exclude_patterns: &[String], follow_symlinks: bool) -> Result<Self, globset::Error> {
        Ok(Self { excludes: build_globset(exclude_patterns)?, follow_symlinks })
    }

    /// Walks every root and returns the flat list of media files in traversal order.
    ///
    /// Missing roots and unreadable directories are logged and skipped.
    pub fn walk(&self, roots: &[PathBuf]) -> Vec<MediaFile> {
        roots.iter().flat_map(|root| self.walk_root(root)).collect()
    }

    /// Lazily enumerates the media files of a single root.
    pub fn walk_root<'a>(&'a self, root: &'a Path) -> Box<dyn Iterator<Item = MediaFile> + 'a> {
        if !root.is_dir() {
            tracing::warn!(root = %root.display(), "media directory does not exist, skipping");
            return Box::new(std::iter::empty());
        }
        let iter = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || !self.is_excluded(e))
            .filter_map(|res| match res {
                Ok(entry) => Some(entry),
                Err(err) => {
                    let path = err.path().map(|p| p.display().to_string()).unwrap_or_default();
                    tracing::warn!(path = %path, error = %err, "failed to read entry, skipping");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter_map(move |e| {
                let kind = MediaKind::from_path(e.path())?;
                Some(MediaFile { file_path: e.into_path(), source_root: root.to_path_buf(), kind })
            });
        Box::new(iter)
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if is_reserved_name(&entry.file_name().to_string_lossy()) {
            return true;
        }
        matches_excludes(entry.path(), &self.excludes)
    }
}

/// Hidden entries and library bundles are skipped at every level.
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with('.') || name.ends_with(LIBRARY_BUNDLE_SUFFIX)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        // Backslashes zu Slashes, passend zur Normalisierung in `matches_excludes`
        let norm = p.trim().replace('\\', "/");
        b.add(Glob::new(&norm)?);
    }
    b.build()
}

fn matches_excludes(path: &Path, set: &GlobSet) -> bool {
    if set.is_empty() {
        return false;
    }
    let s = path.to_string_lossy().replace('\\', "/");
    set.is_match(&s)
}

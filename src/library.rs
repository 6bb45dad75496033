//! Read paths over the media roots: id resolution, listing, root management.
//!
//! Nothing in here generates thumbnails; listings only report whether an
//! artifact exists.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Tag, Value};
use tokio::sync::RwLock;

use crate::codec::Thumbnailer;
use crate::identity;
use crate::store::{atomic_write_json, read_json, DateCache, LocationCache};
use crate::types::{FileLocation, MediaFile, MediaItem, MediaKind, MediaPage};
use crate::walker::MediaWalker;

pub const MEDIA_DIRS_FILE: &str = "media-dirs.json";

/// Ordered list of media roots, changeable at runtime.
///
/// An override written through [`MediaDirs::replace`] is persisted and wins
/// over `media.dirs` at the next start.
pub struct MediaDirs {
    path: PathBuf,
    dirs: RwLock<Vec<PathBuf>>,
}

impl MediaDirs {
    pub fn load(data_dir: &Path, configured: Vec<PathBuf>) -> Self {
        let path = data_dir.join(MEDIA_DIRS_FILE);
        let dirs = match read_json::<Vec<PathBuf>>(&path) {
            Some(saved) => {
                tracing::info!(count = saved.len(), "using persisted media directories");
                saved
            }
            None => configured,
        };
        Self { path, dirs: RwLock::new(dirs) }
    }

    pub async fn snapshot(&self) -> Vec<PathBuf> {
        self.dirs.read().await.clone()
    }

    pub async fn replace(&self, dirs: Vec<PathBuf>) -> io::Result<()> {
        let mut deduped: Vec<PathBuf> = Vec::with_capacity(dirs.len());
        for d in dirs {
            if !deduped.contains(&d) {
                deduped.push(d);
            }
        }
        let mut g = self.dirs.write().await;
        atomic_write_json(&self.path, &deduped)?;
        *g = deduped;
        Ok(())
    }

    /// Removes one root. Returns `false` when it was not configured.
    pub async fn remove(&self, dir: &Path) -> io::Result<bool> {
        let mut g = self.dirs.write().await;
        let Some(pos) = g.iter().position(|d| d == dir) else {
            return Ok(false);
        };
        let mut next = g.clone();
        next.remove(pos);
        atomic_write_json(&self.path, &next)?;
        *g = next;
        Ok(true)
    }
}

pub struct MediaLibrary {
    media_dirs: Arc<MediaDirs>,
    walker: Arc<MediaWalker>,
    locations: Arc<LocationCache>,
    dates: Arc<DateCache>,
    thumbnailer: Arc<Thumbnailer>,
}

impl MediaLibrary {
    pub fn new(
        media_dirs: Arc<MediaDirs>,
        walker: Arc<MediaWalker>,
        locations: Arc<LocationCache>,
        dates: Arc<DateCache>,
        thumbnailer: Arc<Thumbnailer>,
    ) -> Self {
        Self { media_dirs, walker, locations, dates, thumbnailer }
    }

    pub fn media_dirs(&self) -> &Arc<MediaDirs> {
        &self.media_dirs
    }

    pub fn walker(&self) -> &Arc<MediaWalker> {
        &self.walker
    }

    pub fn locations(&self) -> &Arc<LocationCache> {
        &self.locations
    }

    pub fn dates(&self) -> &Arc<DateCache> {
        &self.dates
    }

    pub fn thumbnailer(&self) -> &Arc<Thumbnailer> {
        &self.thumbnailer
    }

    pub fn thumbnail_path(&self, file_id: &str) -> PathBuf {
        self.thumbnailer.thumbnail_path(file_id)
    }

    pub fn thumbnail_exists(&self, file_id: &str) -> bool {
        self.thumbnailer.thumbnail_exists(file_id)
    }

    /// Resolves a file id to its location.
    ///
    /// A cache hit is only trusted if the file still exists inside a configured
    /// root and still hashes to `file_id`; otherwise the roots are walked again
    /// and the cache entry refreshed.
    pub async fn resolve_file_id(&self, file_id: &str) -> Option<FileLocation> {
        if !identity::is_valid_file_id(file_id) {
            return None;
        }
        let roots = self.media_dirs.snapshot().await;

        if let Some(loc) = self.locations.get(file_id) {
            if verify_location(&loc, file_id, &roots) {
                return Some(loc);
            }
            tracing::debug!(file_id = %file_id, "location cache entry is stale, walking roots");
        }

        let walker = Arc::clone(&self.walker);
        let wanted = file_id.to_string();
        let found = tokio::task::spawn_blocking(move || {
            roots.iter().find_map(|root| walker.walk_root(root).find(|f| f.file_id() == wanted))
        })
        .await
        .ok()
        .flatten()?;

        let loc = found.location();
        if let Err(e) = self.locations.set(file_id.to_string(), loc.clone()) {
            tracing::warn!(file_id = %file_id, error = %e, "failed to update location cache");
        }
        Some(loc)
    }

    /// One page of media in traversal order.
    pub async fn list_media(&self, offset: usize, limit: usize) -> io::Result<MediaPage> {
        let roots = self.media_dirs.snapshot().await;
        let walker = Arc::clone(&self.walker);
        let files = tokio::task::spawn_blocking(move || walker.walk(&roots))
            .await
            .map_err(io::Error::other)?;

        let total = files.len();
        let mut thumbs = Vec::with_capacity(limit.min(total));
        for file in files.into_iter().skip(offset).take(limit) {
            thumbs.push(self.describe(&file).await);
        }
        Ok(MediaPage { thumbs, total, has_more: offset.saturating_add(limit) < total, offset, limit })
    }

    async fn describe(&self, file: &MediaFile) -> MediaItem {
        let file_id = file.file_id();
        let thumb_ready = self.thumbnailer.thumbnail_exists(&file_id);
        let duration = if thumb_ready { self.thumbnailer.video_duration(file).await } else { None };
        let created_at = self.dates.get(&file.file_path).or_else(|| modified_rfc3339(&file.file_path));
        MediaItem {
            file: file.relative_path().to_string_lossy().replace('\\', "/"),
            thumb: format!("/thumbs/{}", file_id),
            file_id,
            kind: file.kind,
            duration,
            thumb_ready,
            created_at,
        }
    }
}

fn verify_location(loc: &FileLocation, file_id: &str, roots: &[PathBuf]) -> bool {
    if !loc.file_path.is_file() || !roots.iter().any(|r| r == &loc.source_root) {
        return false;
    }
    let Ok(rel) = loc.file_path.strip_prefix(&loc.source_root) else {
        return false;
    };
    identity::file_id(&loc.source_root, rel) == file_id && is_within_roots(&loc.file_path, roots)
}

/// Whether `path` resolves to a location below one of `roots`.
///
/// Both sides are canonicalized, so `..` segments and symlinks pointing out of
/// a root are rejected.
pub fn is_within_roots(path: &Path, roots: &[PathBuf]) -> bool {
    let Ok(target) = fs::canonicalize(path) else {
        return false;
    };
    roots.iter().filter_map(|r| fs::canonicalize(r).ok()).any(|root| target.starts_with(&root))
}

/// Capture date as RFC 3339: EXIF `DateTimeOriginal` for images, else mtime.
pub fn capture_date(file: &MediaFile) -> Option<String> {
    if file.kind == MediaKind::Image {
        if let Some(d) = exif_date_time_original(&file.file_path) {
            return Some(d);
        }
    }
    modified_rfc3339(&file.file_path)
}

fn exif_date_time_original(path: &Path) -> Option<String> {
    let f = fs::File::open(path).ok()?;
    let exif = exif::Reader::new().read_from_container(&mut io::BufReader::new(f)).ok()?;
    let field = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)?;
    let Value::Ascii(ref parts) = field.value else {
        return None;
    };
    let raw = std::str::from_utf8(parts.first()?).ok()?;
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok()?;
    Some(naive.and_utc().to_rfc3339())
}

fn modified_rfc3339(path: &Path) -> Option<String> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified).to_rfc3339())
}

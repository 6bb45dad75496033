use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "heic"];
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "hevc"];

impl MediaKind {
    /// Classifies a path by its extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, MediaKind::Video)
    }
}

pub fn is_heic(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("heic"))
        .unwrap_or(false)
}

/// A media file found below one of the configured roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub file_path: PathBuf,
    pub source_root: PathBuf,
    pub kind: MediaKind,
}

impl MediaFile {
    pub fn relative_path(&self) -> &Path {
        self.file_path.strip_prefix(&self.source_root).unwrap_or(&self.file_path)
    }

    pub fn file_id(&self) -> String {
        identity::file_id(&self.source_root, self.relative_path())
    }

    pub fn location(&self) -> FileLocation {
        FileLocation { file_path: self.file_path.clone(), source_root: self.source_root.clone() }
    }
}

/// Persisted inverse of a file id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    pub file_path: PathBuf,
    pub source_root: PathBuf,
}

/// Process-wide scan progress, persisted to `scan-state.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanState {
    pub is_scanning: bool,
    pub progress: u8,
    /// Files processed so far: already thumbnailed, generated or failed.
    pub scanned: u64,
    pub total: u64,
    pub images_count: u64,
    pub videos_count: u64,
    pub deleted_thumbs: u64,
    pub generated: u64,
    pub failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// `round(scanned / total * 100)`, clamped to 100.
pub fn progress_percent(scanned: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (scanned as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Messages pushed to live progress observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    Connected { client_id: Uuid },
    State(ScanState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub accepted: bool,
    pub state: ScanState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    /// Path relative to its media root.
    pub file: String,
    pub file_id: String,
    pub thumb: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub duration: Option<String>,
    pub thumb_ready: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPage {
    pub thumbs: Vec<MediaItem>,
    pub total: usize,
    pub has_more: bool,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDirsRequest {
    pub media_dirs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveMediaDirRequest {
    pub media_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDirsResponse {
    pub media_dirs: Vec<String>,
}

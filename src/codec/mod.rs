//! Thumbnail synthesis and video probing.
//!
//! [`Thumbnailer`] owns the on-disk artifact contract (`{fileId}.thumb.jpg`,
//! existence-only staleness, write-then-rename). The actual pixel work sits
//! behind [`ThumbnailGenerator`]; production uses [`ExternalCodec`].

pub mod heic;
pub mod raster;
pub mod video;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use tokio::process::Command;

use crate::config::AppConfig;
use crate::types::{is_heic, MediaFile, MediaKind};

use self::heic::ConverterChain;

pub const THUMB_SUFFIX: &str = ".thumb.jpg";
pub const PARTIAL_SUFFIX: &str = ".partial.jpg";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{tool} is not installed")]
    ToolMissing { tool: String },
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed { tool: String, status: String, stderr: String },
    #[error("{tool} is unavailable: {reason}")]
    Unavailable { tool: String, reason: String },
    #[error("all HEIC converters failed for {path} ({attempts:?})")]
    ConvertersExhausted { path: PathBuf, attempts: Vec<String> },
    #[error("image error: {0}")]
    Image(#[from] ::image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec worker failed: {0}")]
    Join(String),
}

/// Writes one square JPEG for `source` at `dest`.
#[async_trait]
pub trait ThumbnailGenerator: Send + Sync {
    async fn generate(&self, source: &Path, dest: &Path, kind: MediaKind) -> Result<(), CodecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbOutcome {
    Existing,
    Generated,
}

pub struct Thumbnailer {
    thumb_dir: PathBuf,
    generator: Arc<dyn ThumbnailGenerator>,
    ffprobe: String,
    durations: Mutex<LruCache<String, Option<String>>>,
}

impl Thumbnailer {
    pub fn new(
        thumb_dir: PathBuf,
        generator: Arc<dyn ThumbnailGenerator>,
        ffprobe: String,
        duration_cache_size: usize,
    ) -> Self {
        let cap = NonZeroUsize::new(duration_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self { thumb_dir, generator, ffprobe, durations: Mutex::new(LruCache::new(cap)) }
    }

    pub fn thumb_dir(&self) -> &Path {
        &self.thumb_dir
    }

    pub fn thumbnail_path(&self, file_id: &str) -> PathBuf {
        self.thumb_dir.join(format!("{}{}", file_id, THUMB_SUFFIX))
    }

    pub fn thumbnail_exists(&self, file_id: &str) -> bool {
        self.thumbnail_path(file_id).is_file()
    }

    /// Generates the thumbnail for `file` unless one already exists.
    ///
    /// The generator writes to a hidden partial file which is renamed into place
    /// on success and removed on failure, so a failed attempt leaves no artifact.
    pub async fn ensure_thumbnail(&self, file: &MediaFile) -> Result<ThumbOutcome, CodecError> {
        let file_id = file.file_id();
        let target = self.thumbnail_path(&file_id);
        if target.is_file() {
            return Ok(ThumbOutcome::Existing);
        }
        tokio::fs::create_dir_all(&self.thumb_dir).await?;
        let partial = self.thumb_dir.join(format!(".{}{}", file_id, PARTIAL_SUFFIX));

        match self.generator.generate(&file.file_path, &partial, file.kind).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::rename(&partial, &target).await {
                    let _ = tokio::fs::remove_file(&partial).await;
                    return Err(e.into());
                }
                tracing::info!(file_id = %file_id, path = %file.file_path.display(), "thumbnail generated");
                Ok(ThumbOutcome::Generated)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    /// `"M:SS"` for a video, probed only once its thumbnail exists.
    ///
    /// Probe failures yield `None`; results are memoized per file id.
    pub async fn video_duration(&self, file: &MediaFile) -> Option<String> {
        if !file.kind.is_video() {
            return None;
        }
        let file_id = file.file_id();
        if !self.thumbnail_exists(&file_id) {
            return None;
        }
        if let Some(hit) = self.durations.lock().ok().and_then(|mut c| c.get(&file_id).cloned()) {
            return hit;
        }
        let duration = video::probe_duration(&self.ffprobe, &file.file_path).await;
        if let Ok(mut c) = self.durations.lock() {
            c.put(file_id, duration.clone());
        }
        duration
    }
}

/// Production generator backed by the `image` crate and external tools.
pub struct ExternalCodec {
    size: u32,
    quality: u8,
    video_seek_secs: u32,
    ffmpeg: String,
    temp_dir: PathBuf,
    heic: ConverterChain,
}

impl ExternalCodec {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            size: cfg.thumbnails.size,
            quality: cfg.thumbnails.jpeg_quality,
            video_seek_secs: cfg.thumbnails.video_seek_secs,
            ffmpeg: cfg.tools.ffmpeg.clone(),
            temp_dir: cfg.data_dir().join(TEMP_DIR_NAME),
            heic: ConverterChain::from_config(cfg),
        }
    }

    async fn render(&self, source: PathBuf, dest: PathBuf, orientation: raster::Orientation) -> Result<(), CodecError> {
        let (size, quality) = (self.size, self.quality);
        tokio::task::spawn_blocking(move || raster::render_square_jpeg(&source, &dest, size, quality, orientation))
            .await
            .map_err(|e| CodecError::Join(e.to_string()))?
    }

    async fn heic_thumb(&self, source: &Path, dest: &Path) -> Result<(), CodecError> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        let stem = source.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let temp = self.temp_dir.join(format!("{}-{}.jpg", stem, uuid::Uuid::new_v4().simple()));

        let result = async {
            let converter = self.heic.convert(source, &temp).await?;
            // Converters that bake rotation into pixels leave orientation tags that
            // must not be applied a second time.
            let orientation = if converter.orientation_baked() {
                raster::Orientation::Normal
            } else {
                raster::Orientation::from_path(&temp).unwrap_or_default()
            };
            self.render(temp.clone(), dest.to_path_buf(), orientation).await
        }
        .await;

        if let Err(e) = tokio::fs::remove_file(&temp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(path = %temp.display(), error = %e, "failed to remove temp conversion");
            }
        }
        result
    }
}

/// Directory below `data_dir` for intermediate conversions.
pub const TEMP_DIR_NAME: &str = "temp";

#[async_trait]
impl ThumbnailGenerator for ExternalCodec {
    async fn generate(&self, source: &Path, dest: &Path, kind: MediaKind) -> Result<(), CodecError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match kind {
            MediaKind::Video => video::extract_frame(&self.ffmpeg, source, dest, self.size, self.video_seek_secs).await,
            MediaKind::Image if is_heic(source) => self.heic_thumb(source, dest).await,
            MediaKind::Image => {
                let orientation = raster::Orientation::from_path(source).unwrap_or_default();
                self.render(source.to_path_buf(), dest.to_path_buf(), orientation).await
            }
        }
    }
}

/// Runs an external tool to completion, mapping spawn and exit failures.
pub(crate) async fn run_tool<I, S>(tool: &str, args: I) -> Result<Output, CodecError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let output = Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CodecError::ToolMissing { tool: tool.to_string() }
            } else {
                CodecError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.trim().lines().last().unwrap_or_default().chars().take(400).collect();
        return Err(CodecError::ToolFailed { tool: tool.to_string(), status: output.status.to_string(), stderr: tail });
    }
    Ok(output)
}

//! Shared fixtures: a scratch layout and a scriptable thumbnail generator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::codec::{CodecError, ThumbnailGenerator};
use crate::config::AppConfig;
use crate::state::AppState;
use crate::types::MediaKind;

/// Records every call and writes a fake JPEG unless told to fail.
#[derive(Default)]
pub struct MockGenerator {
    pub calls: AtomicUsize,
    pub sources: Mutex<Vec<PathBuf>>,
    /// File names whose generation fails.
    pub fail_on: Vec<String>,
    /// File names whose generation panics.
    pub panic_on: Vec<String>,
    pub delay: Option<Duration>,
    /// Calls with index >= `gate_after` wait for the gate.
    pub gate: Option<Arc<Notify>>,
    pub gate_after: usize,
}

impl MockGenerator {
    pub fn failing(names: &[&str]) -> Self {
        Self { fail_on: names.iter().map(|s| s.to_string()).collect(), ..Self::default() }
    }

    pub fn panicking(names: &[&str]) -> Self {
        Self { panic_on: names.iter().map(|s| s.to_string()).collect(), ..Self::default() }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn gated(gate: Arc<Notify>, gate_after: usize) -> Self {
        Self { gate: Some(gate), gate_after, ..Self::default() }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThumbnailGenerator for MockGenerator {
    async fn generate(&self, source: &Path, dest: &Path, _kind: MediaKind) -> Result<(), CodecError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().unwrap().push(source.to_path_buf());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.gate {
            if index >= self.gate_after {
                gate.notified().await;
            }
        }
        let name = source.file_name().unwrap().to_string_lossy().to_string();
        if self.panic_on.contains(&name) {
            panic!("codec crashed on {}", name);
        }
        if self.fail_on.contains(&name) {
            // Leave a truncated artifact behind like a crashing codec would
            fs::write(dest, b"trunc").unwrap();
            return Err(CodecError::ToolFailed {
                tool: "mock".into(),
                status: "exit status: 1".into(),
                stderr: format!("cannot decode {}", name),
            });
        }
        fs::write(dest, b"\xFF\xD8fake-jpeg\xFF\xD9").unwrap();
        Ok(())
    }
}

/// Scratch layout: `media/` root plus `data/` and `thumbs/`.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("media")).unwrap();
        Self { dir }
    }

    pub fn media_root(&self) -> PathBuf {
        self.dir.path().join("media")
    }

    pub fn thumb_dir(&self) -> PathBuf {
        self.dir.path().join("thumbs")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    /// Creates a file below the media root, including parent directories.
    pub fn touch(&self, rel: &str) -> PathBuf {
        let path = self.media_root().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel.as_bytes()).unwrap();
        path
    }

    pub fn config(&self) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.media.dirs = self.media_root().to_string_lossy().to_string();
        cfg.media.thumb_dir = self.thumb_dir().to_string_lossy().to_string();
        cfg.media.data_dir = self.data_dir().to_string_lossy().to_string();
        cfg.thumbnails.concurrency = Some(1);
        cfg.tools.ffprobe = "bildwald-test-no-such-ffprobe".into();
        cfg
    }

    pub fn state_with(&self, cfg: AppConfig, generator: Arc<MockGenerator>) -> AppState {
        AppState::with_generator(cfg, generator).unwrap()
    }

    pub fn state(&self, generator: Arc<MockGenerator>) -> AppState {
        self.state_with(self.config(), generator)
    }

    /// Names of all finished thumbnails in the thumbnail directory.
    pub fn thumb_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match fs::read_dir(self.thumb_dir()) {
            Ok(rd) => rd
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().to_string())
                .filter(|n| n.ends_with(".thumb.jpg") && !n.starts_with('.'))
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

//! Scan state machine: `Idle -> Scanning -> (Completed | Failed) -> Idle`.
//!
//! A run walks every media root, reconciles the caches against the walk result
//! and fills in missing thumbnails with a bounded worker pool. Progress is
//! persisted and broadcast after every file that needed generation.

pub mod lock;

use std::collections::HashSet;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use futures::{stream, FutureExt, StreamExt};
use tokio::task::JoinHandle;

use crate::broadcaster::{ProgressBroadcaster, Subscription};
use crate::codec::{ThumbOutcome, TEMP_DIR_NAME};
use crate::config::AppConfig;
use crate::library::{capture_date, MediaLibrary};
use crate::metrics::Metrics;
use crate::reconciler::CacheReconciler;
use crate::store::ScanStateStore;
use crate::types::{progress_percent, MediaFile, MediaKind, ScanState};

use self::lock::{ForceRelease, ScanLock, ScanLockGuard};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("no media directories configured")]
    NoMediaRoots,
    #[error("thumbnail directory is not configured")]
    ThumbDirUnset,
    #[error("scan lock unavailable: {0}")]
    Lock(#[source] io::Error),
    #[error("scan failed: {0:#}")]
    Pipeline(#[from] anyhow::Error),
}

impl ScanError {
    /// Configuration problems are reported before any lock or state change.
    pub fn is_config(&self) -> bool {
        matches!(self, ScanError::NoMediaRoots | ScanError::ThumbDirUnset)
    }
}

/// Outcome of [`ScanOrchestrator::start_scan`].
#[derive(Debug)]
pub struct ScanStart {
    pub accepted: bool,
    /// Initial state when accepted, otherwise the state of the running scan.
    pub state: ScanState,
    handle: Option<JoinHandle<Result<ScanState, ScanError>>>,
}

impl ScanStart {
    /// Waits for the accepted run to finish. For a rejected request this
    /// returns the state captured at rejection time.
    pub async fn wait(self) -> Result<ScanState, ScanError> {
        match self.handle {
            Some(handle) => handle.await.map_err(|e| ScanError::Pipeline(anyhow::anyhow!(e)))?,
            None => Ok(self.state),
        }
    }
}

#[derive(Clone)]
pub struct ScanOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    library: Arc<MediaLibrary>,
    states: ScanStateStore,
    lock: Arc<ScanLock>,
    broadcaster: ProgressBroadcaster,
    metrics: Metrics,
    thumb_dir: Option<PathBuf>,
    temp_dir: PathBuf,
    concurrency: usize,
}

impl ScanOrchestrator {
    pub fn new(cfg: &AppConfig, library: Arc<MediaLibrary>, broadcaster: ProgressBroadcaster, metrics: Metrics) -> Self {
        let data_dir = cfg.data_dir();
        let inner = Inner {
            library,
            states: ScanStateStore::open(&data_dir),
            lock: Arc::new(ScanLock::new(&data_dir, cfg.scanner.stale_lock_secs)),
            broadcaster,
            metrics,
            thumb_dir: cfg.thumb_dir(),
            temp_dir: data_dir.join(TEMP_DIR_NAME),
            concurrency: cfg.thumb_concurrency().max(1),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Current state; zeroed default if no scan ever ran.
    pub fn get_scan_state(&self) -> ScanState {
        self.inner.states.current().unwrap_or_default()
    }

    pub fn subscribe(&self) -> Subscription {
        let states = &self.inner.states;
        self.inner.broadcaster.register(|| states.current())
    }

    pub fn lock(&self) -> &ScanLock {
        &self.inner.lock
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.lock.is_running()
    }

    /// Starts a scan unless one is already running.
    ///
    /// Configuration errors are returned before the lock is touched. A busy
    /// lock yields `accepted = false` together with the current state; the
    /// request is not queued.
    pub async fn start_scan(&self) -> Result<ScanStart, ScanError> {
        let roots = self.inner.library.media_dirs().snapshot().await;
        if roots.is_empty() {
            return Err(ScanError::NoMediaRoots);
        }
        let thumb_dir = self.inner.thumb_dir.clone().ok_or(ScanError::ThumbDirUnset)?;

        let guard = match self.inner.lock.try_acquire().map_err(ScanError::Lock)? {
            Some(guard) => guard,
            None => {
                self.inner.metrics.inc_scans_rejected();
                let state = self.get_scan_state();
                tracing::info!(scanned = state.scanned, total = state.total, "scan already running, request rejected");
                return Ok(ScanStart { accepted: false, state, handle: None });
            }
        };
        self.inner.metrics.inc_scans_started();

        // Mark the run as active before the walk, so a rejected caller never
        // sees the idle state of the previous run.
        let started_at = Utc::now();
        let mut state = ScanState { is_scanning: true, started_at: Some(started_at), ..ScanState::default() };
        self.publish(&state);
        let pending = PendingStart { orchestrator: self, guard: Some(guard) };
        tracing::info!(roots = roots.len(), "scan started");

        let walker = Arc::clone(self.inner.library.walker());
        let walked = tokio::task::spawn_blocking(move || walker.walk(&roots)).await;
        let Some(guard) = pending.disarm() else {
            return Err(ScanError::Lock(io::Error::other("scan lock released before the walk finished")));
        };
        let files = match walked {
            Ok(files) => files,
            Err(e) => return Err(self.fail(guard, anyhow::anyhow!("media walk aborted: {}", e))),
        };
        self.inner.metrics.add_files_walked(files.len() as u64);

        state.total = files.len() as u64;
        state.images_count = files.iter().filter(|f| f.kind == MediaKind::Image).count() as u64;
        state.videos_count = state.total - state.images_count;
        self.publish(&state);

        let this = self.clone();
        let initial = state.clone();
        let handle = tokio::spawn(async move { this.run(guard, thumb_dir, files, state).await });
        Ok(ScanStart { accepted: true, state: initial, handle: Some(handle) })
    }

    /// Clears a lock left behind by a crashed process. A persisted state that
    /// still claims to be scanning is closed at the same time.
    pub fn clear_stale_lock(&self) -> Result<ForceRelease, ScanError> {
        self.inner
            .lock
            .force_release(|| {
                let mut state = self.get_scan_state();
                if state.is_scanning {
                    state.is_scanning = false;
                    state.completed_at = Some(Utc::now());
                    self.publish(&state);
                }
            })
            .map_err(ScanError::Lock)
    }

    async fn run(
        self,
        guard: ScanLockGuard,
        thumb_dir: PathBuf,
        files: Vec<MediaFile>,
        state: ScanState,
    ) -> Result<ScanState, ScanError> {
        let outcome = AssertUnwindSafe(self.pipeline(thumb_dir, files, state)).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("scan pipeline panicked")),
        };

        match result {
            Ok(mut state) => {
                state.is_scanning = false;
                state.progress = 100;
                state.completed_at = Some(Utc::now());
                self.publish(&state);
                drop(guard);
                self.inner.metrics.inc_scans_completed();
                tracing::info!(
                    total = state.total,
                    generated = state.generated,
                    failed = state.failed,
                    deleted_thumbs = state.deleted_thumbs,
                    "scan completed"
                );
                Ok(state)
            }
            Err(e) => Err(self.fail(guard, e)),
        }
    }

    /// Failed transition: persist and broadcast a zeroed state, then release
    /// the lock. Thumbnails already written stay on disk.
    fn fail(&self, guard: ScanLockGuard, err: anyhow::Error) -> ScanError {
        tracing::error!(error = ?err, "scan failed");
        self.publish_closed();
        drop(guard);
        self.inner.metrics.inc_scans_failed();
        ScanError::Pipeline(err)
    }

    /// Zeroed, finished state. Must be published while the lock is still held.
    fn publish_closed(&self) {
        let state = ScanState { completed_at: Some(Utc::now()), ..ScanState::default() };
        self.publish(&state);
    }

    async fn pipeline(&self, thumb_dir: PathBuf, files: Vec<MediaFile>, mut state: ScanState) -> anyhow::Result<ScanState> {
        let library = &self.inner.library;

        let valid: HashSet<String> = files.iter().map(MediaFile::file_id).collect();
        let reconciler = CacheReconciler::new(
            thumb_dir,
            self.inner.temp_dir.clone(),
            Arc::clone(library.locations()),
            Arc::clone(library.dates()),
        );
        let report = tokio::task::spawn_blocking(move || reconciler.clean_orphans(&valid))
            .await
            .context("reconciliation task failed")?;
        state.deleted_thumbs = report.thumbnails;
        self.inner.metrics.add_orphans_deleted(report.total());

        self.refresh_caches(&files).await?;

        // Files that already have a thumbnail count as processed up front
        let thumbnailer = Arc::clone(library.thumbnailer());
        let (existing, missing): (Vec<MediaFile>, Vec<MediaFile>) =
            files.into_iter().partition(|f| thumbnailer.thumbnail_exists(&f.file_id()));
        state.scanned = existing.len() as u64;
        state.progress = progress_percent(state.scanned, state.total);
        self.publish(&state);
        tracing::info!(existing = existing.len(), missing = missing.len(), workers = self.inner.concurrency, "generating thumbnails");

        let mut results = stream::iter(missing.into_iter().map(|file| {
            let thumbnailer = Arc::clone(&thumbnailer);
            async move {
                let outcome = thumbnailer.ensure_thumbnail(&file).await;
                (file, outcome)
            }
        }))
        .buffer_unordered(self.inner.concurrency);

        // Counters are only touched here, one completion at a time
        while let Some((file, outcome)) = results.next().await {
            state.scanned += 1;
            match outcome {
                Ok(ThumbOutcome::Generated) => {
                    state.generated += 1;
                    self.inner.metrics.inc_thumbs_generated();
                }
                Ok(ThumbOutcome::Existing) => {}
                Err(e) => {
                    state.failed += 1;
                    self.inner.metrics.inc_thumbs_failed();
                    tracing::warn!(path = %file.file_path.display(), error = %e, "thumbnail generation failed");
                }
            }
            state.progress = progress_percent(state.scanned, state.total);
            self.publish(&state);
        }
        Ok(state)
    }

    /// Rebuilds the location cache from the walk and adds capture dates for
    /// files not seen before. Write failures are logged only.
    async fn refresh_caches(&self, files: &[MediaFile]) -> anyhow::Result<()> {
        let locations = Arc::clone(self.inner.library.locations());
        let dates = Arc::clone(self.inner.library.dates());
        let files = files.to_vec();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = locations.rebuild(files.iter().map(|f| (f.file_id(), f.location()))) {
                tracing::warn!(error = %e, "failed to rebuild location cache");
            }
            let fresh: Vec<_> = files
                .iter()
                .filter(|f| !dates.contains(&f.file_path))
                .filter_map(|f| capture_date(f).map(|d| (f.file_path.clone(), d)))
                .collect();
            if !fresh.is_empty() {
                dates.extend(fresh);
                if let Err(e) = dates.persist() {
                    tracing::warn!(error = %e, "failed to persist date cache");
                }
            }
        })
        .await
        .context("cache refresh task failed")
    }

    fn publish(&self, state: &ScanState) {
        self.inner.states.save(state);
        self.inner.broadcaster.broadcast(state);
    }
}

/// Lock held by a `start_scan` call that has not spawned its run yet.
///
/// If the caller's future is dropped during the walk, the published
/// `is_scanning` state is closed before the lock is released.
struct PendingStart<'a> {
    orchestrator: &'a ScanOrchestrator,
    guard: Option<ScanLockGuard>,
}

impl PendingStart<'_> {
    fn disarm(mut self) -> Option<ScanLockGuard> {
        self.guard.take()
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            tracing::warn!("scan start cancelled during the media walk");
            self.orchestrator.publish_closed();
            drop(guard);
            self.orchestrator.inner.metrics.inc_scans_failed();
        }
    }
}

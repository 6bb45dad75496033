use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters for scans and thumbnail work
#[derive(Clone)]
pub struct Metrics {
    pub scans_started: Arc<AtomicUsize>,
    pub scans_completed: Arc<AtomicUsize>,
    pub scans_failed: Arc<AtomicUsize>,
    pub scans_rejected: Arc<AtomicUsize>,
    pub files_walked: Arc<AtomicU64>,
    pub thumbs_generated: Arc<AtomicU64>,
    pub thumbs_failed: Arc<AtomicU64>,
    pub orphans_deleted: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_started: Arc::new(AtomicUsize::new(0)),
            scans_completed: Arc::new(AtomicUsize::new(0)),
            scans_failed: Arc::new(AtomicUsize::new(0)),
            scans_rejected: Arc::new(AtomicUsize::new(0)),
            files_walked: Arc::new(AtomicU64::new(0)),
            thumbs_generated: Arc::new(AtomicU64::new(0)),
            thumbs_failed: Arc::new(AtomicU64::new(0)),
            orphans_deleted: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_scans_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_completed(&self) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_scans_rejected(&self) {
        self.scans_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_files_walked(&self, count: u64) {
        self.files_walked.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_thumbs_generated(&self) {
        self.thumbs_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_thumbs_failed(&self) {
        self.thumbs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_orphans_deleted(&self, count: u64) {
        self.orphans_deleted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_started: self.scans_started.load(Ordering::Relaxed),
            scans_completed: self.scans_completed.load(Ordering::Relaxed),
            scans_failed: self.scans_failed.load(Ordering::Relaxed),
            scans_rejected: self.scans_rejected.load(Ordering::Relaxed),
            files_walked: self.files_walked.load(Ordering::Relaxed),
            thumbs_generated: self.thumbs_generated.load(Ordering::Relaxed),
            thumbs_failed: self.thumbs_failed.load(Ordering::Relaxed),
            orphans_deleted: self.orphans_deleted.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub scans_started: usize,
    pub scans_completed: usize,
    pub scans_failed: usize,
    pub scans_rejected: usize,
    pub files_walked: u64,
    pub thumbs_generated: u64,
    pub thumbs_failed: u64,
    pub orphans_deleted: u64,
    pub uptime_seconds: u64,
}

use std::sync::Arc;

use crate::broadcaster::ProgressBroadcaster;
use crate::codec::{ExternalCodec, ThumbnailGenerator, Thumbnailer};
use crate::config::AppConfig;
use crate::library::{MediaDirs, MediaLibrary};
use crate::metrics::Metrics;
use crate::scanner::ScanOrchestrator;
use crate::store::{DateCache, LocationCache};
use crate::walker::MediaWalker;

/// The shared application state.
///
/// Cloned into every handler. All members are cheap handles around shared
/// components; the scan orchestrator and the read paths see the same caches.
#[derive(Clone)]
pub struct AppState {
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Media roots, location and date caches, thumbnail lookups.
    pub library: Arc<MediaLibrary>,
    /// The scan state machine.
    pub scanner: ScanOrchestrator,
    /// Live progress fan-out used by the SSE endpoint.
    pub broadcaster: ProgressBroadcaster,
    /// The application metrics.
    pub metrics: Metrics,
}

impl AppState {
    /// Wires up the production thumbnail codec.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let generator: Arc<dyn ThumbnailGenerator> = Arc::new(ExternalCodec::from_config(&config));
        Self::with_generator(config, generator)
    }

    /// Same as [`AppState::new`] with a caller-supplied thumbnail generator.
    pub fn with_generator(config: AppConfig, generator: Arc<dyn ThumbnailGenerator>) -> anyhow::Result<Self> {
        let data_dir = config.data_dir();
        let walker = MediaWalker::new(&config.media.excludes, config.media.follow_symlinks)?;
        let thumbnailer = Thumbnailer::new(
            config.thumb_dir().unwrap_or_default(),
            generator,
            config.tools.ffprobe.clone(),
            config.scanner.duration_cache_size,
        );
        let library = Arc::new(MediaLibrary::new(
            Arc::new(MediaDirs::load(&data_dir, config.media_dirs())),
            Arc::new(walker),
            Arc::new(LocationCache::open(&data_dir)),
            Arc::new(DateCache::open(&data_dir)),
            Arc::new(thumbnailer),
        ));
        let broadcaster = ProgressBroadcaster::new(config.scanner.observer_buffer);
        let metrics = Metrics::new();
        let scanner = ScanOrchestrator::new(&config, Arc::clone(&library), broadcaster.clone(), metrics.clone());

        Ok(Self { config: Arc::new(config), library, scanner, broadcaster, metrics })
    }
}

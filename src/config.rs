use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Comma-separated list of absolute media roots.
    pub dirs: String,
    pub thumb_dir: String,
    pub data_dir: String,
    pub follow_symlinks: bool,
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThumbnailConfig {
    pub size: u32,
    pub jpeg_quality: u8,
    pub video_seek_secs: u32,
    pub concurrency: Option<usize>,
    pub heic_converters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub heif_convert: String,
    pub sips: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    pub stale_lock_secs: Option<u64>,
    pub observer_buffer: usize,
    pub duration_cache_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub thumbnails: ThumbnailConfig,
    pub tools: ToolsConfig,
    pub scanner: ScannerConfig,
}

/// Converter names accepted in `thumbnails.heic_converters`.
pub const KNOWN_HEIC_CONVERTERS: [&str; 3] = ["heif-convert", "ffmpeg", "sips"];

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl AppConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.media.data_dir)
    }

    /// Thumbnail directory, `None` when unset.
    pub fn thumb_dir(&self) -> Option<PathBuf> {
        let t = self.media.thumb_dir.trim();
        if t.is_empty() {
            None
        } else {
            Some(PathBuf::from(t))
        }
    }

    pub fn media_dirs(&self) -> Vec<PathBuf> {
        parse_media_dirs(&self.media.dirs)
    }

    /// Worker pool size for thumbnail generation.
    pub fn thumb_concurrency(&self) -> usize {
        self.thumbnails.concurrency.unwrap_or_else(|| (num_cpus::get() / 2).max(1))
    }
}

/// Splits a comma-separated root list, trimming whitespace and dropping empties.
pub fn parse_media_dirs(raw: &str) -> Vec<PathBuf> {
    raw.split(',').map(str::trim).filter(|d| !d.is_empty()).map(PathBuf::from).collect()
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: bildwald.toml (in CWD)
        .add_source(::config::File::with_name("bildwald").required(false));

    if let Ok(custom_path) = std::env::var("BILDWALD_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("BILDWALD").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Media
    if cfg.media.data_dir.trim().is_empty() {
        return Err(anyhow::anyhow!("media.data_dir must not be empty"));
    }
    for pat in &cfg.media.excludes {
        globset::Glob::new(pat.trim())
            .map_err(|e| anyhow::anyhow!("invalid media.excludes pattern {:?}: {}", pat, e))?;
    }
    for dir in cfg.media_dirs() {
        if !dir.is_absolute() {
            tracing::warn!("Media directory {} is not absolute", dir.display());
        }
    }

    // Thumbnails
    if !(16..=2048).contains(&cfg.thumbnails.size) {
        return Err(anyhow::anyhow!("thumbnails.size must be in 16..=2048"));
    }
    if !(1..=100).contains(&cfg.thumbnails.jpeg_quality) {
        return Err(anyhow::anyhow!("thumbnails.jpeg_quality must be in 1..=100"));
    }
    if let Some(c) = cfg.thumbnails.concurrency {
        if c == 0 || c > 64 {
            return Err(anyhow::anyhow!("thumbnails.concurrency must be in 1..=64"));
        }
    }
    for name in &cfg.thumbnails.heic_converters {
        if !KNOWN_HEIC_CONVERTERS.contains(&name.as_str()) {
            return Err(anyhow::anyhow!("unknown heic converter: {}", name));
        }
    }

    // Scanner
    if cfg.scanner.observer_buffer == 0 {
        return Err(anyhow::anyhow!("scanner.observer_buffer must be > 0"));
    }
    if cfg.scanner.duration_cache_size == 0 {
        return Err(anyhow::anyhow!("scanner.duration_cache_size must be > 0"));
    }
    if cfg.scanner.stale_lock_secs == Some(0) {
        return Err(anyhow::anyhow!("scanner.stale_lock_secs must be > 0 when set"));
    }

    Ok(())
}

/// Creates the data and thumbnail directories if they are configured.
pub fn ensure_dirs(cfg: &AppConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(cfg.data_dir())?;
    if let Some(thumbs) = cfg.thumb_dir() {
        std::fs::create_dir_all(thumbs)?;
    }
    Ok(())
}


use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Health check endpoint - lightweight, no rate limiting
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: data dir and thumbnail dir must exist and be writable
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let data_dir = state.config.data_dir();
    let Some(thumb_dir) = state.config.thumb_dir() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: thumbnail directory unset".to_string()).into_response();
    };
    for dir in [data_dir, thumb_dir] {
        if let Err(e) = probe_writable(&dir).await {
            return (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}: {}", dir.display(), e)).into_response();
        }
    }
    (StatusCode::OK, "ready".to_string()).into_response()
}

async fn probe_writable(dir: &std::path::Path) -> std::io::Result<()> {
    let meta = tokio::fs::metadata(dir).await?;
    if !meta.is_dir() {
        return Err(std::io::Error::other("not a directory"));
    }
    if meta.permissions().readonly() {
        return Err(std::io::Error::other("read-only"));
    }
    Ok(())
}

// Metrics endpoint: returns JSON snapshot
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_snapshot();
    Json(snapshot)
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let body = format!(
        "# HELP bildwald_scans_started Total scans started\n# TYPE bildwald_scans_started counter\nbildwald_scans_started {}\n\
# HELP bildwald_scans_completed Total scans completed\n# TYPE bildwald_scans_completed counter\nbildwald_scans_completed {}\n\
# HELP bildwald_scans_failed Total scans failed\n# TYPE bildwald_scans_failed counter\nbildwald_scans_failed {}\n\
# HELP bildwald_scans_rejected Scan requests rejected while a scan was running\n# TYPE bildwald_scans_rejected counter\nbildwald_scans_rejected {}\n\
# HELP bildwald_files_walked Media files enumerated\n# TYPE bildwald_files_walked counter\nbildwald_files_walked {}\n\
# HELP bildwald_thumbs_generated Thumbnails generated\n# TYPE bildwald_thumbs_generated counter\nbildwald_thumbs_generated {}\n\
# HELP bildwald_thumbs_failed Thumbnail generation failures\n# TYPE bildwald_thumbs_failed counter\nbildwald_thumbs_failed {}\n\
# HELP bildwald_orphans_deleted Orphaned cache entries removed\n# TYPE bildwald_orphans_deleted counter\nbildwald_orphans_deleted {}\n\
# HELP bildwald_uptime_seconds Uptime seconds\n# TYPE bildwald_uptime_seconds gauge\nbildwald_uptime_seconds {}\n",
        m.scans_started,
        m.scans_completed,
        m.scans_failed,
        m.scans_rejected,
        m.files_walked,
        m.thumbs_generated,
        m.thumbs_failed,
        m.orphans_deleted,
        m.uptime_seconds,
    );
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}

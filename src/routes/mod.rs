//! HTTP route handlers for the Bildwald API.
//!
//! Thin glue over the library: handlers validate input, call into the scan
//! orchestrator or the media library and shape JSON.
//!
//! - `health`: liveness, readiness, metrics and version
//! - `scan`: scan trigger, state, live progress (SSE) and lock recovery
//! - `media`: listing, thumbnail and original file serving
//! - `media_dirs`: runtime management of the media roots

pub mod health;
pub mod media;
pub mod media_dirs;
pub mod scan;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// All API routes with state applied; transport layers are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
        .route("/scan", post(scan::start_scan).get(scan::get_scan))
        .route("/scan/events", get(scan::scan_events))
        .route("/scan/lock", axum::routing::delete(scan::clear_lock))
        .route("/thumbs", get(media::list_thumbs))
        .route("/thumbs/{file_id}", get(media::serve_thumb))
        .route("/media/{file_id}", get(media::serve_media))
        .route(
            "/media-dirs",
            get(media_dirs::get_media_dirs).post(media_dirs::set_media_dirs).delete(media_dirs::remove_media_dir),
        )
        .with_state(state)
}

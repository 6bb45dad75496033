use std::path::PathBuf;

use axum::{extract::State, Json};

use crate::error::{validation, AppError, AppResult};
use crate::state::AppState;
use crate::types::{MediaDirsRequest, MediaDirsResponse, RemoveMediaDirRequest};

fn to_response(dirs: Vec<PathBuf>) -> MediaDirsResponse {
    MediaDirsResponse { media_dirs: dirs.into_iter().map(|d| d.to_string_lossy().to_string()).collect() }
}

pub async fn get_media_dirs(State(state): State<AppState>) -> Json<MediaDirsResponse> {
    Json(to_response(state.library.media_dirs().snapshot().await))
}

/// Replaces the root list. The next scan picks it up, no restart needed.
pub async fn set_media_dirs(
    State(state): State<AppState>,
    Json(req): Json<MediaDirsRequest>,
) -> AppResult<Json<MediaDirsResponse>> {
    validation::validate_media_dirs(&req.media_dirs)?;
    let dirs: Vec<PathBuf> = req.media_dirs.iter().map(|d| PathBuf::from(d.trim())).collect();
    let dirs_handle = state.library.media_dirs();
    dirs_handle.replace(dirs).await?;
    tracing::info!(count = req.media_dirs.len(), "media directories updated");
    Ok(Json(to_response(dirs_handle.snapshot().await)))
}

pub async fn remove_media_dir(
    State(state): State<AppState>,
    Json(req): Json<RemoveMediaDirRequest>,
) -> AppResult<Json<MediaDirsResponse>> {
    validation::validate_path(&req.media_dir)?;
    let dirs_handle = state.library.media_dirs();
    if !dirs_handle.remove(std::path::Path::new(req.media_dir.trim())).await? {
        return Err(AppError::NotFound(format!("Media directory {} is not configured", req.media_dir)));
    }
    tracing::info!(dir = %req.media_dir, "media directory removed");
    Ok(Json(to_response(dirs_handle.snapshot().await)))
}

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{validation, AppError, AppResult, OptionExt};
use crate::library::is_within_roots;
use crate::state::AppState;
use crate::types::MediaPage;

const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

pub async fn list_thumbs(State(state): State<AppState>, Query(q): Query<ListQuery>) -> AppResult<Json<MediaPage>> {
    if state.library.media_dirs().snapshot().await.is_empty() {
        return Err(AppError::BadRequest("No media directories configured".into()));
    }
    let offset = q.offset.unwrap_or(0);
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    Ok(Json(state.library.list_media(offset, limit).await?))
}

/// Thumbnails never change in place, so clients may cache them forever.
pub async fn serve_thumb(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    req: Request<Body>,
) -> AppResult<Response> {
    validation::validate_file_id(&file_id)?;
    if !state.library.thumbnail_exists(&file_id) {
        return Err(AppError::NotFound(format!("Thumbnail {} not found", file_id)));
    }
    let path = state.library.thumbnail_path(&file_id);
    let mut res = ServeFile::new(path).oneshot(req).await.unwrap_or_else(|e| match e {}).into_response();
    res.headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000, immutable"));
    Ok(res)
}

/// Streams the original file. Range requests are handled by `ServeFile`.
pub async fn serve_media(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    req: Request<Body>,
) -> AppResult<Response> {
    validation::validate_file_id(&file_id)?;
    let loc = state.library.resolve_file_id(&file_id).await.ok_or_not_found("Media file")?;
    let roots = state.library.media_dirs().snapshot().await;
    if !is_within_roots(&loc.file_path, &roots) {
        tracing::warn!(file_id = %file_id, path = %loc.file_path.display(), "refusing to serve file outside media roots");
        return Err(AppError::Forbidden("File is outside the configured media directories".into()));
    }
    Ok(ServeFile::new(&loc.file_path).oneshot(req).await.unwrap_or_else(|e| match e {}).into_response())
}

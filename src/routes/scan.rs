use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::{Stream, StreamExt};

use crate::error::{AppError, AppResult};
use crate::scanner::lock::ForceRelease;
use crate::state::AppState;
use crate::types::{ScanState, StartScanResponse};

#[derive(Debug, Default, Deserialize)]
pub struct StartScanQuery {
    /// Block until the run finishes and return the final state.
    #[serde(default)]
    pub wait: bool,
}

pub async fn start_scan(State(state): State<AppState>, Query(q): Query<StartScanQuery>) -> AppResult<Response> {
    let start = state.scanner.start_scan().await?;
    if !start.accepted {
        let body = StartScanResponse { accepted: false, state: start.state };
        return Ok((StatusCode::CONFLICT, Json(body)).into_response());
    }
    if q.wait {
        let final_state = start.wait().await?;
        return Ok((StatusCode::OK, Json(StartScanResponse { accepted: true, state: final_state })).into_response());
    }
    // Dropping the join handle detaches the run
    let body = StartScanResponse { accepted: true, state: start.state.clone() };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

pub async fn get_scan(State(state): State<AppState>) -> Json<ScanState> {
    Json(state.scanner.get_scan_state())
}

pub async fn scan_events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.scanner.subscribe().map(|msg| {
        let data = serde_json::to_string(&msg)
            .unwrap_or_else(|_| json!({"type":"error","message":"serialization error"}).to_string());
        Ok::<Event, Infallible>(Event::default().data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

/// Removes a scan lock left behind by a crashed process.
pub async fn clear_lock(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let removed = match state.scanner.clear_stale_lock()? {
        ForceRelease::Busy => return Err(AppError::Conflict("A scan is running in this process".into())),
        ForceRelease::Removed => true,
        ForceRelease::NotPresent => false,
    };
    Ok(Json(json!({ "removed": removed, "state": state.scanner.get_scan_state() })))
}

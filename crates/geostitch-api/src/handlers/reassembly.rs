//! Reassembly trigger handlers.

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use geostitch_service::dispatch::ReassemblyResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /api/reassembly
///
/// Direct reassembly request: `{ bookingId, sessionId?, manifestKey?,
/// baseFileName?, ... }`. The dispatcher classifies the payload, so the
/// scheduled-sweep marker body is also accepted here.
pub async fn trigger(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<ReassemblyResponse>, ApiError> {
    let response = state.dispatcher.dispatch(payload).await?;
    Ok(Json(response))
}

/// POST /api/events/storage
///
/// Object-created notification delivery. Non-manifest keys acknowledge as
/// a no-op; manifest keys register the session and attempt reassembly.
pub async fn storage_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<ReassemblyResponse>, ApiError> {
    let response = state.dispatcher.dispatch(payload).await?;
    Ok(Json(response))
}

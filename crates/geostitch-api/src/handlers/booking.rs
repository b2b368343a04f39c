//! Booking read-path handlers.

use axum::Json;
use axum::extract::{Path, State};

use geostitch_entity::registry::ResourceCatalog as _;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/bookings/{booking_id}/imagery
///
/// The booking-details read path: the most recent completed session's
/// reassembled file, a storage-scan fallback, or a pending-parts report.
pub async fn imagery(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = state.imagery.lookup(&booking_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": report })))
}

/// GET /api/bookings/{booking_id}/resources
///
/// All resource records produced for a booking, newest first.
pub async fn resources(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let records = state.catalog.find_by_booking(&booking_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "data": records })))
}

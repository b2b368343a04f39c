//! Health and readiness probes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use geostitch_core::traits::object_store::ObjectStore as _;

use crate::state::AppState;

/// GET /api/health — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/health/ready — readiness probe covering the database and the
/// object store.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database = state.db.health_check().await.unwrap_or(false);
    let store = state.store.health_check().await.unwrap_or(false);

    let status = if database && store {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "database": database,
            "object_store": store,
        })),
    )
}

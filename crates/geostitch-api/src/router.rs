//! Route definitions for the GeoStitch HTTP API.
//!
//! All routes are mounted under `/api`. The router receives `AppState` and
//! passes it to all handlers via Axum's `State` extractor.

use axum::Router;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_body = state.config.server.max_body_bytes;

    let api_routes = Router::new()
        .merge(reassembly_routes())
        .merge(booking_routes())
        .merge(health_routes());

    Router::new()
        .nest("/api", api_routes)
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Trigger ingestion endpoints
fn reassembly_routes() -> Router<AppState> {
    Router::new()
        .route("/reassembly", post(handlers::reassembly::trigger))
        .route("/events/storage", post(handlers::reassembly::storage_event))
}

/// Booking read-path endpoints
fn booking_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/bookings/{booking_id}/imagery",
            get(handlers::booking::imagery),
        )
        .route(
            "/bookings/{booking_id}/resources",
            get(handlers::booking::resources),
        )
}

/// Health probes
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/ready", get(handlers::health::ready))
}

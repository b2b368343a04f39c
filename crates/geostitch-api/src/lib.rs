//! # geostitch-api
//!
//! Axum HTTP surface for GeoStitch: trigger ingestion (direct requests and
//! storage-event notifications), the booking imagery read path, and health
//! probes.

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

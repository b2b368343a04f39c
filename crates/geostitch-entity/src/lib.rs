//! # geostitch-entity
//!
//! Persistent data model for GeoStitch: upload sessions, chunk manifests,
//! resource records, and the registry traits through which services reach
//! them. Concrete PostgreSQL implementations live in `geostitch-database`;
//! the `mock` feature provides in-memory implementations for tests.

pub mod manifest;
pub mod registry;
pub mod resource;
pub mod session;

#[cfg(feature = "mock")]
pub mod mock;

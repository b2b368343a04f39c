//! # geostitch-core
//!
//! Core crate for GeoStitch. Contains the object-store gateway trait,
//! configuration schemas, storage-event models, and the unified error
//! system.
//!
//! This crate has **no** internal dependencies on other GeoStitch crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;

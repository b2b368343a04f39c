//! # geostitch-service
//!
//! Orchestration layer: classifies invocation payloads into trigger shapes,
//! runs per-session reassembly, finalizes results, and serves the booking
//! imagery read path.

pub mod dispatch;
pub mod finalizer;
pub mod imagery;

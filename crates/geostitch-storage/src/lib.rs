//! # geostitch-storage
//!
//! Object store gateways and the chunked-reassembly pipeline components:
//! chunk discovery, manifest resolution, completion checking, and the
//! reassembly engine with its two assembly strategies.

pub mod chunked;
pub mod providers;

//! Chunked-upload reassembly components.
//!
//! The pipeline runs leaf-first: [`locator`] discovers a session's chunk
//! keys, [`manifest`] resolves (or synthesizes) the session descriptor,
//! [`completion`] decides readiness, and [`assembler`] combines the chunks
//! into the final object.

pub mod assembler;
pub mod completion;
pub mod locator;
pub mod manifest;
pub mod part_index;

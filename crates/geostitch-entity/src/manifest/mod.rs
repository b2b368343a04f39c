//! Chunk manifest descriptor.

use serde::{Deserialize, Serialize};

/// The JSON descriptor an uploading client writes once per session,
/// alongside the chunks, naming the session and the expected chunk count.
///
/// Wire keys are camelCase (the uploader is a browser client). The manifest
/// is best-effort: it may never arrive, or arrive malformed, and reassembly
/// must be able to proceed from a heuristically reconstructed equivalent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkManifest {
    /// Time-derived session identifier.
    pub session_id: String,
    /// Original file name before chunking.
    pub original_file_name: String,
    /// Total number of chunks the client produced.
    pub total_chunks: i32,
    /// Checksum of the original file, when the client computed one.
    #[serde(default)]
    pub checksum: Option<String>,
    /// Client-side timestamp (epoch milliseconds).
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl ChunkManifest {
    /// The conventional storage key for this session's manifest object.
    pub fn storage_key(booking_id: &str, session_id: &str) -> String {
        format!("{booking_id}/{session_id}_manifest.json")
    }

    /// Whether a key names a manifest object.
    pub fn is_manifest_key(key: &str) -> bool {
        key.ends_with("_manifest.json")
    }
}

//! Upload session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::SessionStatus;

/// One chunked-upload attempt for a booking, tracking expected and received
/// chunk counts through to a terminal completed/failed state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadSession {
    /// The booking this upload belongs to.
    pub booking_id: String,
    /// Time-derived session identifier, unique within the booking.
    pub session_id: String,
    /// File name reported by the uploading client.
    pub original_file_name: String,
    /// Total number of chunks expected.
    pub total_chunks: i32,
    /// Expected checksum of the final file, when the client provided one.
    pub checksum: Option<String>,
    /// Current status: `pending`, `completed`, or `failed`.
    pub status: String,
    /// Number of chunks confirmed present in the object store.
    ///
    /// Recomputed from an authoritative recount on every completion check,
    /// never blindly incremented, so duplicate or retried uploads cannot
    /// inflate it.
    pub chunks_uploaded: i32,
    /// Key of the stored manifest object, when one was seen.
    pub manifest_key: Option<String>,
    /// Identifier of the resource record produced on completion.
    pub final_resource_id: Option<Uuid>,
    /// Retrieval URL of the reassembled object, set on completion.
    pub reassembled_url: Option<String>,
    /// Failure detail, set when the session is marked failed.
    pub error_message: Option<String>,
    /// When the session row was created.
    pub created_at: DateTime<Utc>,
    /// When the session row was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the session completed (if it did).
    pub completed_at: Option<DateTime<Utc>>,
    /// When the session failed (if it did).
    pub failed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    /// Parsed status value.
    pub fn session_status(&self) -> SessionStatus {
        SessionStatus::from_str_or_pending(&self.status)
    }

    /// Whether this session is still pending.
    pub fn is_pending(&self) -> bool {
        self.session_status() == SessionStatus::Pending
    }

    /// Whether the recorded chunk count already meets the expected total.
    ///
    /// `>=` rather than `==`: a recount can exceed the total when retried
    /// uploads left duplicate-suffixed objects for the same part indices.
    pub fn has_all_chunks(&self) -> bool {
        self.total_chunks >= 1 && self.chunks_uploaded >= self.total_chunks
    }
}

/// Parameters for creating (or re-registering) a pending upload session.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    /// The booking this upload belongs to.
    pub booking_id: String,
    /// Time-derived session identifier.
    pub session_id: String,
    /// File name reported by the uploading client.
    pub original_file_name: String,
    /// Total number of chunks expected.
    pub total_chunks: i32,
    /// Expected checksum of the final file.
    pub checksum: Option<String>,
    /// Key of the stored manifest object, when one exists.
    pub manifest_key: Option<String>,
}

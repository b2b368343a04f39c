//! Resource records — the durable output artifact of a reassembly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Resource type recorded for reassembled raster imagery.
pub const RESOURCE_TYPE_GEOTIFF: &str = "geotiff";

/// A reassembled file registered for a booking.
///
/// Created exactly once per successful reassembly and never mutated
/// afterward; a later independent reassembly produces a new record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResourceRecord {
    /// Globally unique resource identifier.
    pub id: Uuid,
    /// The booking this resource belongs to.
    pub booking_id: String,
    /// The upload session that produced it.
    pub session_id: String,
    /// Final (cleaned) file name.
    pub file_name: String,
    /// MIME type of the assembled object.
    pub content_type: String,
    /// Resource category, `"geotiff"` for assembled imagery.
    pub resource_type: String,
    /// Object key of the assembled file.
    pub storage_key: String,
    /// Long-lived retrieval URL.
    pub url: String,
    /// Assembled size in bytes.
    pub size_bytes: i64,
    /// Whether this file arrived via chunked upload.
    pub is_chunked_file: bool,
    /// Whether assembly completed (always true for stored records).
    pub is_complete: bool,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Parameters for registering a reassembled file.
#[derive(Debug, Clone)]
pub struct NewResourceRecord {
    /// Pre-generated resource identifier (also embedded in the output key).
    pub id: Uuid,
    /// The booking this resource belongs to.
    pub booking_id: String,
    /// The upload session that produced it.
    pub session_id: String,
    /// Final (cleaned) file name.
    pub file_name: String,
    /// MIME type of the assembled object.
    pub content_type: String,
    /// Object key of the assembled file.
    pub storage_key: String,
    /// Long-lived retrieval URL.
    pub url: String,
    /// Assembled size in bytes.
    pub size_bytes: i64,
}

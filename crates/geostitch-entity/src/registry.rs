//! Registry traits for session and resource persistence.
//!
//! Defined here so that services depend on the seam rather than on
//! PostgreSQL; `geostitch-database` provides the concrete implementations
//! and the `mock` feature provides in-memory ones for tests.

use async_trait::async_trait;
use uuid::Uuid;

use geostitch_core::result::AppResult;

use crate::resource::{NewResourceRecord, ResourceRecord};
use crate::session::{NewUploadSession, UploadSession};

/// Durable record of upload sessions: the chunk registry.
#[async_trait]
pub trait SessionRegistry: Send + Sync + std::fmt::Debug + 'static {
    /// Create the session row if absent, returning the stored row.
    ///
    /// An existing row is returned as-is — re-registering never resets an
    /// in-flight or terminal session.
    async fn upsert_pending(&self, new: &NewUploadSession) -> AppResult<UploadSession>;

    /// Fetch one session.
    async fn find(&self, booking_id: &str, session_id: &str) -> AppResult<Option<UploadSession>>;

    /// Pending sessions, oldest first, for the periodic sweep.
    async fn list_pending(&self, limit: i64) -> AppResult<Vec<UploadSession>>;

    /// Persist an authoritative recount of present chunks.
    async fn record_chunk_count(
        &self,
        booking_id: &str,
        session_id: &str,
        count: i32,
    ) -> AppResult<()>;

    /// Transition pending → completed, recording the resource link.
    ///
    /// Conditional on the current status still being `pending`; returns
    /// whether this call performed the transition. A `false` return means
    /// another invocation already finalized (or failed) the session.
    async fn complete_if_pending(
        &self,
        booking_id: &str,
        session_id: &str,
        resource_id: Uuid,
        url: &str,
    ) -> AppResult<bool>;

    /// Transition pending → failed with an error detail.
    ///
    /// Conditional on `pending`, like [`Self::complete_if_pending`].
    async fn fail_if_pending(
        &self,
        booking_id: &str,
        session_id: &str,
        error_message: &str,
    ) -> AppResult<bool>;

    /// Most recently completed session for a booking, if any.
    async fn latest_completed_for_booking(
        &self,
        booking_id: &str,
    ) -> AppResult<Option<UploadSession>>;
}

/// Durable store of reassembled-file records.
#[async_trait]
pub trait ResourceCatalog: Send + Sync + std::fmt::Debug + 'static {
    /// Register a reassembled file.
    async fn create(&self, record: &NewResourceRecord) -> AppResult<ResourceRecord>;

    /// All resource records for a booking, newest first.
    async fn find_by_booking(&self, booking_id: &str) -> AppResult<Vec<ResourceRecord>>;

    /// Number of records produced by one session.
    async fn count_for_session(&self, booking_id: &str, session_id: &str) -> AppResult<u64>;
}

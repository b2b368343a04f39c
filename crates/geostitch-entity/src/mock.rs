//! In-memory registry implementations for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use geostitch_core::result::AppResult;

use crate::registry::{ResourceCatalog, SessionRegistry};
use crate::resource::{NewResourceRecord, ResourceRecord, RESOURCE_TYPE_GEOTIFF};
use crate::session::{NewUploadSession, SessionStatus, UploadSession};

/// In-memory [`SessionRegistry`] with the same conditional-transition
/// semantics as the PostgreSQL implementation.
#[derive(Debug, Default)]
pub struct MemorySessionRegistry {
    sessions: Mutex<HashMap<(String, String), UploadSession>>,
}

impl MemorySessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for MemorySessionRegistry {
    async fn upsert_pending(&self, new: &NewUploadSession) -> AppResult<UploadSession> {
        let mut sessions = self.sessions.lock().await;
        let key = (new.booking_id.clone(), new.session_id.clone());
        let now = Utc::now();
        let session = sessions.entry(key).or_insert_with(|| UploadSession {
            booking_id: new.booking_id.clone(),
            session_id: new.session_id.clone(),
            original_file_name: new.original_file_name.clone(),
            total_chunks: new.total_chunks,
            checksum: new.checksum.clone(),
            status: SessionStatus::Pending.as_str().to_string(),
            chunks_uploaded: 0,
            manifest_key: new.manifest_key.clone(),
            final_resource_id: None,
            reassembled_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        });
        Ok(session.clone())
    }

    async fn find(&self, booking_id: &str, session_id: &str) -> AppResult<Option<UploadSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(&(booking_id.to_string(), session_id.to_string()))
            .cloned())
    }

    async fn list_pending(&self, limit: i64) -> AppResult<Vec<UploadSession>> {
        let sessions = self.sessions.lock().await;
        let mut pending: Vec<UploadSession> = sessions
            .values()
            .filter(|s| s.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn record_chunk_count(
        &self,
        booking_id: &str,
        session_id: &str,
        count: i32,
    ) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) =
            sessions.get_mut(&(booking_id.to_string(), session_id.to_string()))
        {
            session.chunks_uploaded = count;
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_if_pending(
        &self,
        booking_id: &str,
        session_id: &str,
        resource_id: Uuid,
        url: &str,
    ) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) =
            sessions.get_mut(&(booking_id.to_string(), session_id.to_string()))
        else {
            return Ok(false);
        };
        if !session.is_pending() {
            return Ok(false);
        }
        let now = Utc::now();
        session.status = SessionStatus::Completed.as_str().to_string();
        session.final_resource_id = Some(resource_id);
        session.reassembled_url = Some(url.to_string());
        session.completed_at = Some(now);
        session.updated_at = now;
        Ok(true)
    }

    async fn fail_if_pending(
        &self,
        booking_id: &str,
        session_id: &str,
        error_message: &str,
    ) -> AppResult<bool> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) =
            sessions.get_mut(&(booking_id.to_string(), session_id.to_string()))
        else {
            return Ok(false);
        };
        if !session.is_pending() {
            return Ok(false);
        }
        let now = Utc::now();
        session.status = SessionStatus::Failed.as_str().to_string();
        session.error_message = Some(error_message.to_string());
        session.failed_at = Some(now);
        session.updated_at = now;
        Ok(true)
    }

    async fn latest_completed_for_booking(
        &self,
        booking_id: &str,
    ) -> AppResult<Option<UploadSession>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .filter(|s| {
                s.booking_id == booking_id && s.session_status() == SessionStatus::Completed
            })
            .max_by_key(|s| s.completed_at)
            .cloned())
    }
}

/// In-memory [`ResourceCatalog`].
#[derive(Debug, Default)]
pub struct MemoryResourceCatalog {
    records: Mutex<Vec<ResourceRecord>>,
}

impl MemoryResourceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record (test assertions).
    pub async fn all(&self) -> Vec<ResourceRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl ResourceCatalog for MemoryResourceCatalog {
    async fn create(&self, record: &NewResourceRecord) -> AppResult<ResourceRecord> {
        let stored = ResourceRecord {
            id: record.id,
            booking_id: record.booking_id.clone(),
            session_id: record.session_id.clone(),
            file_name: record.file_name.clone(),
            content_type: record.content_type.clone(),
            resource_type: RESOURCE_TYPE_GEOTIFF.to_string(),
            storage_key: record.storage_key.clone(),
            url: record.url.clone(),
            size_bytes: record.size_bytes,
            is_chunked_file: true,
            is_complete: true,
            created_at: Utc::now(),
        };
        self.records.lock().await.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_booking(&self, booking_id: &str) -> AppResult<Vec<ResourceRecord>> {
        let records = self.records.lock().await;
        let mut found: Vec<ResourceRecord> = records
            .iter()
            .filter(|r| r.booking_id == booking_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn count_for_session(&self, booking_id: &str, session_id: &str) -> AppResult<u64> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| r.booking_id == booking_id && r.session_id == session_id)
            .count() as u64)
    }
}

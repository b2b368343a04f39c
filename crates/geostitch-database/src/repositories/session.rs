//! Upload session repository — the chunk registry.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use geostitch_core::error::{AppError, ErrorKind};
use geostitch_core::result::AppResult;
use geostitch_entity::registry::SessionRegistry;
use geostitch_entity::session::{NewUploadSession, SessionStatus, UploadSession};

/// PostgreSQL-backed [`SessionRegistry`].
///
/// Terminal transitions are conditional updates guarded by
/// `status = 'pending'`, so a session can never move backward and racing
/// invocations cannot finalize one session twice.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    /// Create a new session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRegistry for SessionRepository {
    async fn upsert_pending(&self, new: &NewUploadSession) -> AppResult<UploadSession> {
        // On conflict only the bookkeeping timestamp moves; an in-flight or
        // terminal session is returned untouched.
        sqlx::query_as::<_, UploadSession>(
            "INSERT INTO upload_sessions \
             (booking_id, session_id, original_file_name, total_chunks, checksum, \
              status, chunks_uploaded, manifest_key) \
             VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6) \
             ON CONFLICT (booking_id, session_id) \
             DO UPDATE SET updated_at = NOW() \
             RETURNING *",
        )
        .bind(&new.booking_id)
        .bind(&new.session_id)
        .bind(&new.original_file_name)
        .bind(new.total_chunks)
        .bind(&new.checksum)
        .bind(&new.manifest_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to upsert upload session", e)
        })
    }

    async fn find(&self, booking_id: &str, session_id: &str) -> AppResult<Option<UploadSession>> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE booking_id = $1 AND session_id = $2",
        )
        .bind(booking_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find upload session", e)
        })
    }

    async fn list_pending(&self, limit: i64) -> AppResult<Vec<UploadSession>> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE status = $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(SessionStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list pending sessions", e)
        })
    }

    async fn record_chunk_count(
        &self,
        booking_id: &str,
        session_id: &str,
        count: i32,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE upload_sessions SET chunks_uploaded = $3, updated_at = NOW() \
             WHERE booking_id = $1 AND session_id = $2",
        )
        .bind(booking_id)
        .bind(session_id)
        .bind(count)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to record chunk count", e)
        })?;
        Ok(())
    }

    async fn complete_if_pending(
        &self,
        booking_id: &str,
        session_id: &str,
        resource_id: Uuid,
        url: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE upload_sessions \
             SET status = 'completed', final_resource_id = $3, reassembled_url = $4, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE booking_id = $1 AND session_id = $2 AND status = 'pending'",
        )
        .bind(booking_id)
        .bind(session_id)
        .bind(resource_id)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to complete upload session", e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_if_pending(
        &self,
        booking_id: &str,
        session_id: &str,
        error_message: &str,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE upload_sessions \
             SET status = 'failed', error_message = $3, failed_at = NOW(), updated_at = NOW() \
             WHERE booking_id = $1 AND session_id = $2 AND status = 'pending'",
        )
        .bind(booking_id)
        .bind(session_id)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to fail upload session", e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn latest_completed_for_booking(
        &self,
        booking_id: &str,
    ) -> AppResult<Option<UploadSession>> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions \
             WHERE booking_id = $1 AND status = 'completed' \
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                "Failed to find latest completed session",
                e,
            )
        })
    }
}

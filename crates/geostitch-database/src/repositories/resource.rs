//! Resource record repository.

use async_trait::async_trait;
use sqlx::PgPool;

use geostitch_core::error::{AppError, ErrorKind};
use geostitch_core::result::AppResult;
use geostitch_entity::registry::ResourceCatalog;
use geostitch_entity::resource::{NewResourceRecord, ResourceRecord, RESOURCE_TYPE_GEOTIFF};

/// PostgreSQL-backed [`ResourceCatalog`].
#[derive(Debug, Clone)]
pub struct ResourceRepository {
    pool: PgPool,
}

impl ResourceRepository {
    /// Create a new resource repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceCatalog for ResourceRepository {
    async fn create(&self, record: &NewResourceRecord) -> AppResult<ResourceRecord> {
        sqlx::query_as::<_, ResourceRecord>(
            "INSERT INTO resource_records \
             (id, booking_id, session_id, file_name, content_type, resource_type, \
              storage_key, url, size_bytes, is_chunked_file, is_complete) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, TRUE) \
             RETURNING *",
        )
        .bind(record.id)
        .bind(&record.booking_id)
        .bind(&record.session_id)
        .bind(&record.file_name)
        .bind(&record.content_type)
        .bind(RESOURCE_TYPE_GEOTIFF)
        .bind(&record.storage_key)
        .bind(&record.url)
        .bind(record.size_bytes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create resource record", e)
        })
    }

    async fn find_by_booking(&self, booking_id: &str) -> AppResult<Vec<ResourceRecord>> {
        sqlx::query_as::<_, ResourceRecord>(
            "SELECT * FROM resource_records WHERE booking_id = $1 ORDER BY created_at DESC",
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list resource records", e)
        })
    }

    async fn count_for_session(&self, booking_id: &str, session_id: &str) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM resource_records WHERE booking_id = $1 AND session_id = $2",
        )
        .bind(booking_id)
        .bind(session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count resource records", e)
        })?;
        Ok(count as u64)
    }
}

//! Object store gateway trait for pluggable storage backends.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::result::AppResult;

/// Metadata about a stored object.
///
/// `metadata` holds the user-defined key/value pairs attached at upload time.
/// It is populated by [`ObjectStore::head`]; listing returns it empty because
/// bulk listings do not carry per-object metadata.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ObjectMeta {
    /// Object key within the bucket.
    pub key: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Last modified timestamp.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    /// User-defined object metadata.
    pub metadata: HashMap<String, String>,
}

/// Options for a put operation.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// MIME type to record on the object.
    pub content_type: Option<String>,
    /// User-defined metadata to attach.
    pub metadata: HashMap<String, String>,
}

/// A completed part of a multipart upload, identified for the final
/// completion call.
#[derive(Debug, Clone)]
pub struct CompletedPartRef {
    /// 1-based destination part number.
    pub part_number: i32,
    /// ETag returned by the store for the uploaded/copied part.
    pub etag: String,
}

/// An in-progress multipart upload, as reported by the store.
#[derive(Debug, Clone)]
pub struct PendingMultipartUpload {
    /// Destination object key.
    pub key: String,
    /// Store-assigned upload identifier.
    pub upload_id: String,
    /// When the upload was initiated.
    pub initiated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Trait for object storage backends.
///
/// Implementations exist for S3-compatible stores and the local filesystem.
/// The trait is defined here in `geostitch-core` and implemented in
/// `geostitch-storage`. A single instance is bound to one bucket; callers
/// address objects by key only.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the store type name (e.g., "local", "s3").
    fn store_type(&self) -> &str;

    /// Check whether the store is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Write an object.
    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> AppResult<()>;

    /// Read an object fully into memory.
    async fn get(&self, key: &str) -> AppResult<Bytes>;

    /// Fetch metadata for a single object, including user metadata.
    async fn head(&self, key: &str) -> AppResult<ObjectMeta>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// List all objects under a key prefix.
    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectMeta>>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Generate a time-limited retrieval URL for an object.
    ///
    /// Implementations may clamp `expires_in` to their own signing maximum.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> AppResult<String>;

    /// Begin a multipart upload and return its upload identifier.
    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> AppResult<String>;

    /// Server-side copy an existing object as one part of a multipart upload.
    async fn upload_part_copy(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        source_key: &str,
    ) -> AppResult<CompletedPartRef>;

    /// Complete a multipart upload from its accumulated parts.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartRef],
    ) -> AppResult<()>;

    /// Abort a multipart upload, discarding any parts already written.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> AppResult<()>;

    /// List multipart uploads that have been started but not completed
    /// or aborted.
    async fn list_multipart_uploads(&self) -> AppResult<Vec<PendingMultipartUpload>>;
}

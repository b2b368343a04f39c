//! S3-compatible object store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, warn};

use geostitch_core::config::object_store::S3StoreConfig;
use geostitch_core::error::{AppError, ErrorKind};
use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::{
    CompletedPartRef, ObjectMeta, ObjectStore, PendingMultipartUpload, PutOptions,
};

/// SigV4 presigned URLs cannot outlive seven days.
const MAX_PRESIGN: Duration = Duration::from_secs(7 * 24 * 3600);

/// Encoding set for the `x-amz-copy-source` header: keep path separators
/// and the characters S3 accepts raw in keys.
const COPY_SOURCE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// S3-compatible object store bound to a single bucket.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 store from configuration.
    ///
    /// An empty access key falls back to the ambient credential chain;
    /// a non-empty endpoint switches to path-style addressing for
    /// S3-compatible services (MinIO, R2).
    pub async fn new(config: &S3StoreConfig) -> AppResult<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::configuration("S3 bucket is not configured"));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if !config.access_key.is_empty() && !config.secret_key.is_empty() {
            let creds = Credentials::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                None,
                None,
                "static",
            );
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(&config.endpoint).force_path_style(true);
        }

        tracing::info!(
            bucket = %config.bucket,
            region = %config.region,
            "Initialized S3 object store"
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    fn copy_source(&self, source_key: &str) -> String {
        utf8_percent_encode(&format!("{}/{}", self.bucket, source_key), COPY_SOURCE_SET)
            .to_string()
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn store_type(&self) -> &str {
        "s3"
    }

    async fn health_check(&self) -> AppResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> AppResult<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(opts.content_type)
            .set_metadata(if opts.metadata.is_empty() {
                None
            } else {
                Some(opts.metadata)
            })
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 put failed: {key}"), e)
            })?;

        debug!(key, bytes = size, "Wrote object");
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_key()).unwrap_or(false) {
                    AppError::not_found(format!("Object not found: {key}"))
                } else {
                    AppError::with_source(ErrorKind::Storage, format!("S3 get failed: {key}"), e)
                }
            })?;

        let data = resp.body.collect().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("S3 body read failed: {key}"), e)
        })?;
        Ok(data.into_bytes())
    }

    async fn head(&self, key: &str) -> AppResult<ObjectMeta> {
        let resp = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) {
                    AppError::not_found(format!("Object not found: {key}"))
                } else {
                    AppError::with_source(ErrorKind::Storage, format!("S3 head failed: {key}"), e)
                }
            })?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size_bytes: resp.content_length().unwrap_or(0).max(0) as u64,
            last_modified: resp.last_modified().and_then(to_chrono),
            metadata: resp.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().map(|s| s.is_not_found()).unwrap_or(false) {
                    Ok(false)
                } else {
                    Err(AppError::with_source(
                        ErrorKind::Storage,
                        format!("S3 head failed: {key}"),
                        e,
                    ))
                }
            }
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectMeta>> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if !prefix.is_empty() {
                req = req.prefix(prefix);
            }
            if let Some(token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 list failed: {prefix}"), e)
            })?;

            for obj in resp.contents() {
                entries.push(ObjectMeta {
                    key: obj.key().unwrap_or_default().to_string(),
                    size_bytes: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_chrono),
                    metadata: HashMap::new(),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                continuation_token = resp.next_continuation_token().map(String::from);
            } else {
                return Ok(entries);
            }
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 delete failed: {key}"), e)
            })?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> AppResult<String> {
        let expires = if expires_in > MAX_PRESIGN {
            warn!(
                key,
                requested_secs = expires_in.as_secs(),
                "Requested URL lifetime exceeds the signing maximum; clamping to 7 days"
            );
            MAX_PRESIGN
        } else {
            expires_in
        };

        let presigning = PresigningConfig::expires_in(expires).map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Invalid presigning duration", e)
        })?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, format!("S3 presign failed: {key}"), e)
            })?;

        Ok(request.uri().to_string())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> AppResult<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(String::from))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 create multipart failed: {key}"),
                    e,
                )
            })?;

        resp.upload_id()
            .map(String::from)
            .ok_or_else(|| AppError::storage("S3 returned no multipart upload id"))
    }

    async fn upload_part_copy(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        source_key: &str,
    ) -> AppResult<CompletedPartRef> {
        let resp = self
            .client
            .upload_part_copy()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .copy_source(self.copy_source(source_key))
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 part copy failed: {source_key} -> {key}#{part_number}"),
                    e,
                )
            })?;

        let etag = resp
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(String::from)
            .ok_or_else(|| AppError::storage("S3 part copy returned no ETag"))?;

        Ok(CompletedPartRef { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartRef],
    ) -> AppResult<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 complete multipart failed: {key}"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> AppResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("S3 abort multipart failed: {key}"),
                    e,
                )
            })?;
        Ok(())
    }

    async fn list_multipart_uploads(&self) -> AppResult<Vec<PendingMultipartUpload>> {
        let mut pending = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let mut req = self.client.list_multipart_uploads().bucket(&self.bucket);
            if let Some(marker) = key_marker {
                req = req.key_marker(marker);
            }
            if let Some(marker) = upload_id_marker {
                req = req.upload_id_marker(marker);
            }

            let resp = req.send().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "S3 list multipart uploads failed", e)
            })?;

            for upload in resp.uploads() {
                let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) else {
                    continue;
                };
                pending.push(PendingMultipartUpload {
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    initiated_at: upload.initiated().and_then(to_chrono),
                });
            }

            if resp.is_truncated().unwrap_or(false) {
                key_marker = resp.next_key_marker().map(String::from);
                upload_id_marker = resp.next_upload_id_marker().map(String::from);
            } else {
                return Ok(pending);
            }
        }
    }
}

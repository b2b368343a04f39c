//! Local filesystem object store.
//!
//! Emulates a bucket on disk: objects live under `objects/`, user metadata
//! in sidecar files under `meta/`, and in-progress multipart uploads are
//! staged under `uploads/`. Used for development and tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use geostitch_core::error::{AppError, ErrorKind};
use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::{
    CompletedPartRef, ObjectMeta, ObjectStore, PendingMultipartUpload, PutOptions,
};

/// Sidecar record stored next to each object's data.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct Sidecar {
    content_type: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Staged multipart upload descriptor.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct UploadDescriptor {
    key: String,
    content_type: Option<String>,
    initiated_at: chrono::DateTime<chrono::Utc>,
}

/// Local filesystem object store.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    /// Root directory: holds `objects/`, `meta/`, and `uploads/`.
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a new local store rooted at the given path.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        for sub in ["objects", "meta", "uploads"] {
            fs::create_dir_all(root.join(sub)).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create store directory: {}", root.display()),
                    e,
                )
            })?;
        }
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join("objects").join(key.trim_start_matches('/'))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.root
            .join("meta")
            .join(format!("{}.json", key.trim_start_matches('/')))
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join("uploads").join(upload_id)
    }

    async fn ensure_parent(path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn read_sidecar(&self, key: &str) -> Sidecar {
        match fs::read(self.sidecar_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
            Err(_) => Sidecar::default(),
        }
    }

    async fn read_upload_descriptor(&self, upload_id: &str) -> AppResult<UploadDescriptor> {
        let raw = fs::read(self.upload_dir(upload_id).join("upload.json"))
            .await
            .map_err(|_| {
                AppError::not_found(format!("No such multipart upload: {upload_id}"))
            })?;
        serde_json::from_slice(&raw).map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Corrupt multipart descriptor", e)
        })
    }

    /// Walk every file under `objects/`, returning keys relative to it.
    async fn walk_objects(&self) -> AppResult<Vec<(String, u64, Option<std::time::SystemTime>)>> {
        let objects_root = self.root.join("objects");
        let mut found = Vec::new();
        let mut stack = vec![objects_root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to read directory entry", e)
            })? {
                let path = entry.path();
                let meta = entry.metadata().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Storage, "Failed to read entry metadata", e)
                })?;
                if meta.is_dir() {
                    stack.push(path);
                } else {
                    let key = path
                        .strip_prefix(&objects_root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    found.push((key, meta.len(), meta.modified().ok()));
                }
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn store_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.root.join("objects").is_dir())
    }

    async fn put(&self, key: &str, data: Bytes, opts: PutOptions) -> AppResult<()> {
        let path = self.object_path(key);
        Self::ensure_parent(&path).await?;

        fs::write(&path, &data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to write object: {key}"), e)
        })?;

        if opts.content_type.is_some() || !opts.metadata.is_empty() {
            let sidecar = Sidecar {
                content_type: opts.content_type,
                metadata: opts.metadata,
            };
            let sidecar_path = self.sidecar_path(key);
            Self::ensure_parent(&sidecar_path).await?;
            fs::write(&sidecar_path, serde_json::to_vec(&sidecar)?)
                .await
                .map_err(|e| {
                    AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to write object metadata: {key}"),
                        e,
                    )
                })?;
        }

        debug!(key, bytes = data.len(), "Wrote object");
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Bytes> {
        let data = fs::read(self.object_path(key)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {key}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read object: {key}"),
                    e,
                )
            }
        })?;
        Ok(Bytes::from(data))
    }

    async fn head(&self, key: &str) -> AppResult<ObjectMeta> {
        let meta = fs::metadata(self.object_path(key)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {key}"))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to stat object: {key}"),
                    e,
                )
            }
        })?;

        let sidecar = self.read_sidecar(key).await;
        Ok(ObjectMeta {
            key: key.to_string(),
            size_bytes: meta.len(),
            last_modified: meta
                .modified()
                .ok()
                .map(chrono::DateTime::<chrono::Utc>::from),
            metadata: sidecar.metadata,
        })
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.object_path(key).is_file())
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<ObjectMeta>> {
        let prefix = prefix.trim_start_matches('/');
        let mut entries: Vec<ObjectMeta> = self
            .walk_objects()
            .await?
            .into_iter()
            .filter(|(key, _, _)| key.starts_with(prefix))
            .map(|(key, size, modified)| ObjectMeta {
                key,
                size_bytes: size,
                last_modified: modified.map(chrono::DateTime::<chrono::Utc>::from),
                metadata: HashMap::new(),
            })
            .collect();

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.object_path(key);
        if path.exists() {
            fs::remove_file(&path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete object: {key}"),
                    e,
                )
            })?;
        }
        let sidecar = self.sidecar_path(key);
        if sidecar.exists() {
            let _ = fs::remove_file(&sidecar).await;
        }
        Ok(())
    }

    async fn presign_get(&self, key: &str, _expires_in: Duration) -> AppResult<String> {
        let path = self.object_path(key);
        if !path.is_file() {
            return Err(AppError::not_found(format!("Object not found: {key}")));
        }
        Ok(format!("file://{}", path.display()))
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: Option<&str>,
    ) -> AppResult<String> {
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id);
        fs::create_dir_all(&dir).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to stage multipart upload", e)
        })?;

        let descriptor = UploadDescriptor {
            key: key.to_string(),
            content_type: content_type.map(String::from),
            initiated_at: chrono::Utc::now(),
        };
        fs::write(dir.join("upload.json"), serde_json::to_vec(&descriptor)?)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to write upload descriptor", e)
            })?;

        Ok(upload_id)
    }

    async fn upload_part_copy(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        source_key: &str,
    ) -> AppResult<CompletedPartRef> {
        // Validate the upload exists before staging into it.
        self.read_upload_descriptor(upload_id).await?;

        let data = self.get(source_key).await?;
        let part_path = self.upload_dir(upload_id).join(format!("part-{part_number:06}"));
        let mut file = fs::File::create(&part_path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to stage part copy", e)
        })?;
        file.write_all(&data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to write part copy", e)
        })?;
        file.flush()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to flush part", e))?;

        Ok(CompletedPartRef {
            part_number,
            etag: format!("{}-{}", part_number, data.len()),
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPartRef],
    ) -> AppResult<()> {
        let descriptor = self.read_upload_descriptor(upload_id).await?;
        if descriptor.key != key {
            return Err(AppError::conflict(format!(
                "Multipart upload {upload_id} targets '{}', not '{key}'",
                descriptor.key
            )));
        }

        let mut ordered: Vec<&CompletedPartRef> = parts.iter().collect();
        ordered.sort_by_key(|p| p.part_number);

        let mut assembled = Vec::new();
        for part in ordered {
            let part_path = self
                .upload_dir(upload_id)
                .join(format!("part-{:06}", part.part_number));
            let data = fs::read(&part_path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Missing staged part {}", part.part_number),
                    e,
                )
            })?;
            assembled.extend_from_slice(&data);
        }

        self.put(
            key,
            Bytes::from(assembled),
            PutOptions {
                content_type: descriptor.content_type,
                metadata: HashMap::new(),
            },
        )
        .await?;

        let _ = fs::remove_dir_all(self.upload_dir(upload_id)).await;
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> AppResult<()> {
        let dir = self.upload_dir(upload_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to abort multipart upload", e)
            })?;
        }
        Ok(())
    }

    async fn list_multipart_uploads(&self) -> AppResult<Vec<PendingMultipartUpload>> {
        let uploads_root = self.root.join("uploads");
        let mut pending = Vec::new();

        let mut entries = match fs::read_dir(&uploads_root).await {
            Ok(entries) => entries,
            Err(_) => return Ok(pending),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, "Failed to read uploads directory", e)
        })? {
            let upload_id = entry.file_name().to_string_lossy().to_string();
            if let Ok(descriptor) = self.read_upload_descriptor(&upload_id).await {
                pending.push(PendingMultipartUpload {
                    key: descriptor.key,
                    upload_id,
                    initiated_at: Some(descriptor.initiated_at),
                });
            }
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, LocalObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_str().unwrap())
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_head_delete() {
        let (_dir, store) = store().await;

        let mut metadata = HashMap::new();
        metadata.insert("timestamp".to_string(), "1700000000".to_string());
        store
            .put(
                "bk-1/survey.tif.part0",
                Bytes::from("raster bytes"),
                PutOptions {
                    content_type: Some("image/tiff".into()),
                    metadata,
                },
            )
            .await
            .unwrap();

        assert!(store.exists("bk-1/survey.tif.part0").await.unwrap());

        let head = store.head("bk-1/survey.tif.part0").await.unwrap();
        assert_eq!(head.size_bytes, 12);
        assert_eq!(head.metadata.get("timestamp").unwrap(), "1700000000");

        let data = store.get("bk-1/survey.tif.part0").await.unwrap();
        assert_eq!(data, Bytes::from("raster bytes"));

        store.delete("bk-1/survey.tif.part0").await.unwrap();
        assert!(!store.exists("bk-1/survey.tif.part0").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store().await;
        let err = store.get("bk-1/nope").await.unwrap_err();
        assert_eq!(err.kind, geostitch_core::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_is_recursive_and_prefix_scoped() {
        let (_dir, store) = store().await;
        for key in [
            "bk-1/1700/a.part0",
            "bk-1/1700/a.part1",
            "bk-1/other.txt",
            "bk-2/b.part0",
        ] {
            store
                .put(key, Bytes::from_static(b"x"), PutOptions::default())
                .await
                .unwrap();
        }

        let under_session = store.list("bk-1/1700").await.unwrap();
        assert_eq!(under_session.len(), 2);

        let under_booking = store.list("bk-1/").await.unwrap();
        assert_eq!(under_booking.len(), 3);

        let everything = store.list("").await.unwrap();
        assert_eq!(everything.len(), 4);
    }

    #[tokio::test]
    async fn test_multipart_copy_roundtrip() {
        let (_dir, store) = store().await;
        store
            .put("src/p1", Bytes::from("hello "), PutOptions::default())
            .await
            .unwrap();
        store
            .put("src/p2", Bytes::from("world"), PutOptions::default())
            .await
            .unwrap();

        let upload_id = store
            .create_multipart_upload("out/final.tif", Some("image/tiff"))
            .await
            .unwrap();
        // Copy out of order; completion must honor part numbers.
        let part2 = store
            .upload_part_copy("out/final.tif", &upload_id, 2, "src/p2")
            .await
            .unwrap();
        let part1 = store
            .upload_part_copy("out/final.tif", &upload_id, 1, "src/p1")
            .await
            .unwrap();
        store
            .complete_multipart_upload("out/final.tif", &upload_id, &[part2, part1])
            .await
            .unwrap();

        let data = store.get("out/final.tif").await.unwrap();
        assert_eq!(data, Bytes::from("hello world"));
        assert!(store.list_multipart_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abort_discards_staged_parts() {
        let (_dir, store) = store().await;
        store
            .put("src/p1", Bytes::from("data"), PutOptions::default())
            .await
            .unwrap();

        let upload_id = store
            .create_multipart_upload("out/file.tif", None)
            .await
            .unwrap();
        store
            .upload_part_copy("out/file.tif", &upload_id, 1, "src/p1")
            .await
            .unwrap();
        assert_eq!(store.list_multipart_uploads().await.unwrap().len(), 1);

        store
            .abort_multipart_upload("out/file.tif", &upload_id)
            .await
            .unwrap();
        assert!(store.list_multipart_uploads().await.unwrap().is_empty());
        assert!(!store.exists("out/file.tif").await.unwrap());
    }
}

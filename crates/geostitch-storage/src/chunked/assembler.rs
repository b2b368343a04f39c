//! Reassembly engine — combines ordered chunks into the final object.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use geostitch_core::error::{AppError, ErrorKind};
use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::{CompletedPartRef, ObjectStore, PutOptions};

use super::part_index::{clean_output_filename, sort_chunk_keys};

/// MIME type recorded on assembled raster outputs.
pub const GEOTIFF_CONTENT_TYPE: &str = "image/tiff";

/// The assembled object, ready for finalization.
#[derive(Debug, Clone)]
pub struct AssembledObject {
    /// Generated resource identifier, embedded in the output key.
    pub resource_id: Uuid,
    /// Key of the assembled object.
    pub output_key: String,
    /// Clean output filename.
    pub file_name: String,
}

/// Whether the chunk sizes force direct assembly.
///
/// True when any chunk except the last is below the store's minimum
/// multipart part size — such a set cannot be assembled with server-side
/// part copies.
pub fn needs_direct_assembly(sizes: &[u64], min_part_size: u64) -> bool {
    if sizes.len() <= 1 {
        return false;
    }
    sizes[..sizes.len() - 1]
        .iter()
        .any(|&size| size < min_part_size)
}

/// One way of combining ordered chunks into a single output object.
///
/// Both implementations must produce byte-identical outputs for the same
/// ordered chunk set.
#[async_trait]
trait AssemblyStrategy: Send + Sync {
    /// Strategy name for logging.
    fn name(&self) -> &'static str;

    /// Combine `chunks` (already sorted) into the object at `output_key`.
    async fn assemble(
        &self,
        store: &dyn ObjectStore,
        output_key: &str,
        chunks: &[String],
    ) -> AppResult<()>;
}

/// Downloads every chunk and re-uploads the concatenation as one object.
/// Used when chunks are too small for multipart-copy minimums.
struct DirectAssembly;

#[async_trait]
impl AssemblyStrategy for DirectAssembly {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn assemble(
        &self,
        store: &dyn ObjectStore,
        output_key: &str,
        chunks: &[String],
    ) -> AppResult<()> {
        let mut assembled = Vec::new();
        for key in chunks {
            let data = store.get(key).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Assembly,
                    format!("Failed to download chunk '{key}'"),
                    e,
                )
            })?;
            assembled.extend_from_slice(&data);
        }

        store
            .put(
                output_key,
                Bytes::from(assembled),
                PutOptions {
                    content_type: Some(GEOTIFF_CONTENT_TYPE.to_string()),
                    metadata: Default::default(),
                },
            )
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Assembly,
                    format!("Failed to upload assembled object '{output_key}'"),
                    e,
                )
            })
    }
}

/// Server-side multipart-copy assembly: each chunk becomes one copied part.
/// No chunk bytes transit the worker.
struct MultipartCopyAssembly;

#[async_trait]
impl AssemblyStrategy for MultipartCopyAssembly {
    fn name(&self) -> &'static str {
        "multipart-copy"
    }

    async fn assemble(
        &self,
        store: &dyn ObjectStore,
        output_key: &str,
        chunks: &[String],
    ) -> AppResult<()> {
        let upload_id = store
            .create_multipart_upload(output_key, Some(GEOTIFF_CONTENT_TYPE))
            .await?;

        // Part numbers are 1-based contiguous positions in sorted order;
        // the source filename's own index was only a sort key.
        let copy_result = async {
            let mut parts: Vec<CompletedPartRef> = Vec::with_capacity(chunks.len());
            for (position, key) in chunks.iter().enumerate() {
                let part = store
                    .upload_part_copy(output_key, &upload_id, position as i32 + 1, key)
                    .await?;
                parts.push(part);
            }
            store
                .complete_multipart_upload(output_key, &upload_id, &parts)
                .await
        }
        .await;

        if let Err(e) = copy_result {
            // Never leave an orphaned incomplete upload behind a failure.
            if let Err(abort_err) = store.abort_multipart_upload(output_key, &upload_id).await {
                warn!(
                    output_key,
                    upload_id = %upload_id,
                    error = %abort_err,
                    "Failed to abort multipart upload after assembly failure"
                );
            }
            return Err(AppError::with_source(
                ErrorKind::Assembly,
                format!("Multipart assembly failed for '{output_key}'"),
                e,
            ));
        }

        Ok(())
    }
}

/// Combines a session's chunks into the final reassembled object.
#[derive(Debug, Clone)]
pub struct ReassemblyEngine {
    store: Arc<dyn ObjectStore>,
    min_part_size: u64,
}

impl ReassemblyEngine {
    /// Create an engine with the store's minimum multipart part size.
    pub fn new(store: Arc<dyn ObjectStore>, min_part_size: u64) -> Self {
        Self {
            store,
            min_part_size,
        }
    }

    /// Assemble the session's chunks into one object.
    ///
    /// Sorts the chunk keys by part index, probes chunk sizes to pick the
    /// assembly strategy, and writes the output under
    /// `{booking_id}/reassembled_{resource_id}_{file_name}`.
    pub async fn assemble(
        &self,
        booking_id: &str,
        original_file_name: &str,
        chunk_keys: &[String],
    ) -> AppResult<AssembledObject> {
        if chunk_keys.is_empty() {
            return Err(AppError::assembly("No chunks to assemble"));
        }

        let file_name = clean_output_filename(original_file_name);
        let resource_id = Uuid::new_v4();
        let output_key = format!("{booking_id}/reassembled_{resource_id}_{file_name}");

        let sorted = sort_chunk_keys(chunk_keys)?;

        let mut sizes = Vec::with_capacity(sorted.len());
        for key in &sorted {
            let head = self.store.head(key).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Assembly,
                    format!("Failed to probe chunk size for '{key}'"),
                    e,
                )
            })?;
            sizes.push(head.size_bytes);
        }

        let strategy: &dyn AssemblyStrategy =
            if needs_direct_assembly(&sizes, self.min_part_size) {
                &DirectAssembly
            } else {
                &MultipartCopyAssembly
            };

        info!(
            booking_id,
            output_key = %output_key,
            chunks = sorted.len(),
            total_bytes = sizes.iter().sum::<u64>(),
            strategy = strategy.name(),
            "Assembling chunks"
        );

        strategy.assemble(&*self.store, &output_key, &sorted).await?;

        info!(booking_id, output_key = %output_key, "Assembly complete");
        Ok(AssembledObject {
            resource_id,
            output_key,
            file_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::providers::local::LocalObjectStore;

    use super::*;

    async fn seeded_engine(
        chunks: &[(&str, &[u8])],
        min_part_size: u64,
    ) -> (tempfile::TempDir, Arc<dyn ObjectStore>, ReassemblyEngine) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        for (key, data) in chunks {
            store
                .put(key, Bytes::copy_from_slice(data), PutOptions::default())
                .await
                .unwrap();
        }
        let engine = ReassemblyEngine::new(Arc::clone(&store), min_part_size);
        (dir, store, engine)
    }

    #[test]
    fn test_direct_assembly_predicate() {
        // Any part except the last below the threshold forces direct.
        assert!(needs_direct_assembly(&[4, 10, 10], 5));
        assert!(needs_direct_assembly(&[10, 4, 10], 5));
        // A small final part is allowed by multipart stores.
        assert!(!needs_direct_assembly(&[10, 10, 4], 5));
        assert!(!needs_direct_assembly(&[10, 10, 10], 5));
        // A single chunk is always one full part.
        assert!(!needs_direct_assembly(&[1], 5));
    }

    #[tokio::test]
    async fn test_direct_assembly_concatenates_in_index_order() {
        let (_dir, store, engine) = seeded_engine(
            &[
                ("bk-1/1700/site.tif.part2", b"cc"),
                ("bk-1/1700/site.tif.part0", b"aa"),
                ("bk-1/1700/site.tif.part1", b"bb"),
            ],
            // Chunks are tiny, so this forces the direct strategy.
            1024,
        )
        .await;

        let chunks: Vec<String> = [
            "bk-1/1700/site.tif.part2",
            "bk-1/1700/site.tif.part0",
            "bk-1/1700/site.tif.part1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let assembled = engine.assemble("bk-1", "site.tif", &chunks).await.unwrap();
        assert_eq!(assembled.file_name, "site.tif");
        assert!(assembled.output_key.starts_with("bk-1/reassembled_"));
        assert!(assembled.output_key.ends_with("_site.tif"));

        let data = store.get(&assembled.output_key).await.unwrap();
        assert_eq!(data, Bytes::from("aabbcc"));
    }

    #[tokio::test]
    async fn test_multipart_assembly_matches_direct_output() {
        let payloads: Vec<(String, Vec<u8>)> = (0..3)
            .map(|i| {
                (
                    format!("bk-1/1700/scan.tif.part{i}"),
                    vec![b'a' + i as u8; 64],
                )
            })
            .collect();
        let chunk_refs: Vec<(&str, &[u8])> = payloads
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        let keys: Vec<String> = payloads.iter().map(|(k, _)| k.clone()).collect();

        // Threshold below the chunk size selects multipart copy.
        let (_dir_a, store_a, multipart_engine) = seeded_engine(&chunk_refs, 16).await;
        // Threshold above the chunk size selects direct.
        let (_dir_b, store_b, direct_engine) = seeded_engine(&chunk_refs, 4096).await;

        let via_multipart = multipart_engine
            .assemble("bk-1", "scan.tif", &keys)
            .await
            .unwrap();
        let via_direct = direct_engine.assemble("bk-1", "scan.tif", &keys).await.unwrap();

        let bytes_multipart = store_a.get(&via_multipart.output_key).await.unwrap();
        let bytes_direct = store_b.get(&via_direct.output_key).await.unwrap();
        assert_eq!(bytes_multipart, bytes_direct);
        assert_eq!(bytes_multipart.len(), 3 * 64);

        // No multipart upload left behind either way.
        assert!(store_a.list_multipart_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assembly_order_independent_of_upload_order() {
        let chunk_data: Vec<(&str, &[u8])> = vec![
            ("bk-1/s/f.tif.part0", b"first-"),
            ("bk-1/s/f.tif.part1", b"second-"),
            ("bk-1/s/f.tif.part2", b"third"),
        ];
        let (_dir, store, engine) = seeded_engine(&chunk_data, 4096).await;

        // Feed the keys in a scrambled permutation.
        let scrambled: Vec<String> = ["bk-1/s/f.tif.part1", "bk-1/s/f.tif.part2", "bk-1/s/f.tif.part0"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let assembled = engine.assemble("bk-1", "f.tif", &scrambled).await.unwrap();
        let data = store.get(&assembled.output_key).await.unwrap();
        assert_eq!(data, Bytes::from("first-second-third"));
    }

    #[tokio::test]
    async fn test_failed_multipart_assembly_leaves_no_orphan_upload() {
        let (_dir, store, _engine) = seeded_engine(
            &[
                ("bk-1/s/f.tif.part0", &[0u8; 64] as &[u8]),
                ("bk-1/s/f.tif.part1", &[1u8; 64] as &[u8]),
            ],
            16,
        )
        .await;

        // Delete part1 after the engine's size probe by racing manually:
        // simpler to drive the strategy directly with a missing source.
        let keys: Vec<String> = vec![
            "bk-1/s/f.tif.part0".into(),
            "bk-1/s/missing.tif.part1".into(),
        ];
        let err = MultipartCopyAssembly
            .assemble(&*store, "bk-1/reassembled_x_f.tif", &keys)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Assembly);
        assert!(store.list_multipart_uploads().await.unwrap().is_empty());
        assert!(!store.exists("bk-1/reassembled_x_f.tif").await.unwrap());
    }

    #[tokio::test]
    async fn test_output_filename_is_cleaned() {
        let (_dir, _store, engine) = seeded_engine(
            &[("bk-1/s/upload.part0", b"data" as &[u8])],
            4096,
        )
        .await;

        let assembled = engine
            .assemble("bk-1", "upload.part0", &["bk-1/s/upload.part0".to_string()])
            .await
            .unwrap();
        assert_eq!(assembled.file_name, "upload.tif");
    }
}

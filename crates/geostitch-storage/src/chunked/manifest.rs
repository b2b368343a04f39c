//! Manifest resolution and session registration.

use std::sync::Arc;

use tracing::{info, warn};

use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_entity::manifest::ChunkManifest;
use geostitch_entity::registry::SessionRegistry;
use geostitch_entity::session::{NewUploadSession, UploadSession};

use super::part_index::{key_filename, strip_part_suffix};

/// Locates and parses session manifests, registering the session row they
/// describe. Tolerant by design: a missing or malformed manifest yields
/// `None`, never an error, so callers can fall back to heuristic discovery.
#[derive(Debug, Clone)]
pub struct ManifestResolver {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn SessionRegistry>,
}

impl ManifestResolver {
    /// Create a new manifest resolver.
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Fetch and parse the manifest object at `key`.
    ///
    /// Returns `None` on fetch failure or malformed JSON.
    pub async fn resolve(&self, key: &str) -> Option<ChunkManifest> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "Manifest unavailable; falling back to discovery");
                return None;
            }
        };

        match serde_json::from_slice::<ChunkManifest>(&raw) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(key, error = %e, "Manifest is malformed; falling back to discovery");
                None
            }
        }
    }

    /// Upsert the UploadSession row derived from a manifest, seeding
    /// `chunks_uploaded = 0` and `status = pending`.
    pub async fn register(
        &self,
        booking_id: &str,
        manifest: &ChunkManifest,
        manifest_key: Option<String>,
    ) -> AppResult<UploadSession> {
        let session = self
            .registry
            .upsert_pending(&NewUploadSession {
                booking_id: booking_id.to_string(),
                session_id: manifest.session_id.clone(),
                original_file_name: manifest.original_file_name.clone(),
                total_chunks: manifest.total_chunks,
                checksum: manifest.checksum.clone(),
                manifest_key,
            })
            .await?;

        info!(
            booking_id,
            session_id = %session.session_id,
            total_chunks = session.total_chunks,
            "Registered upload session"
        );
        Ok(session)
    }

    /// Reconstruct a manifest-equivalent descriptor from located chunks,
    /// for sessions whose manifest never arrived.
    pub fn synthesize(session_id: &str, chunk_keys: &[String]) -> ChunkManifest {
        let original_file_name = chunk_keys
            .first()
            .map(|key| strip_part_suffix(key_filename(key)))
            .unwrap_or_else(|| format!("{session_id}.tif"));

        ChunkManifest {
            session_id: session_id.to_string(),
            original_file_name,
            total_chunks: chunk_keys.len() as i32,
            checksum: None,
            timestamp: session_id.parse::<i64>().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use geostitch_core::traits::object_store::PutOptions;
    use geostitch_entity::mock::MemorySessionRegistry;

    use crate::providers::local::LocalObjectStore;

    use super::*;

    async fn resolver() -> (tempfile::TempDir, Arc<dyn ObjectStore>, ManifestResolver) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let registry: Arc<dyn SessionRegistry> = Arc::new(MemorySessionRegistry::new());
        let resolver = ManifestResolver::new(Arc::clone(&store), registry);
        (dir, store, resolver)
    }

    #[tokio::test]
    async fn test_resolve_parses_stored_manifest() {
        let (_dir, store, resolver) = resolver().await;
        store
            .put(
                "bk-1/1700_manifest.json",
                Bytes::from(
                    r#"{"sessionId":"1700","originalFileName":"site.tif","totalChunks":3}"#,
                ),
                PutOptions::default(),
            )
            .await
            .unwrap();

        let manifest = resolver.resolve("bk-1/1700_manifest.json").await.unwrap();
        assert_eq!(manifest.session_id, "1700");
        assert_eq!(manifest.total_chunks, 3);
    }

    #[tokio::test]
    async fn test_resolve_returns_none_on_missing_or_malformed() {
        let (_dir, store, resolver) = resolver().await;
        assert!(resolver.resolve("bk-1/absent_manifest.json").await.is_none());

        store
            .put(
                "bk-1/bad_manifest.json",
                Bytes::from("not json {"),
                PutOptions::default(),
            )
            .await
            .unwrap();
        assert!(resolver.resolve("bk-1/bad_manifest.json").await.is_none());
    }

    #[tokio::test]
    async fn test_register_seeds_pending_session() {
        let (_dir, _store, resolver) = resolver().await;
        let manifest = ChunkManifest {
            session_id: "1700".into(),
            original_file_name: "site.tif".into(),
            total_chunks: 4,
            checksum: Some("abc".into()),
            timestamp: Some(1700),
        };

        let session = resolver
            .register("bk-1", &manifest, Some("bk-1/1700_manifest.json".into()))
            .await
            .unwrap();
        assert!(session.is_pending());
        assert_eq!(session.chunks_uploaded, 0);
        assert_eq!(session.total_chunks, 4);
    }

    #[test]
    fn test_synthesize_from_chunks() {
        let chunks: Vec<String> = ["bk-1/1700/site.tif.part0", "bk-1/1700/site.tif.part1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let manifest = ManifestResolver::synthesize("1700", &chunks);
        assert_eq!(manifest.original_file_name, "site.tif");
        assert_eq!(manifest.total_chunks, 2);
        assert_eq!(manifest.timestamp, Some(1700));
        assert!(manifest.checksum.is_none());
    }
}

//! Booking imagery lookup — the read path consumed by booking details.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_entity::manifest::ChunkManifest;
use geostitch_entity::registry::SessionRegistry;
use geostitch_storage::chunked::part_index::{extract_part_index, key_filename};

/// Imagery availability for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageryState {
    /// A reassembled file is available.
    Ready,
    /// Only unassembled parts exist; reassembly has not finished yet.
    PendingReassembly,
    /// No imagery exists for the booking.
    Missing,
}

/// Lookup result for a booking's imagery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageryReport {
    /// Availability state.
    pub state: ImageryState,
    /// Resource identifier, when ready via a completed session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    /// File name of the available imagery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Retrieval URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Number of unassembled parts, when pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_parts: Option<usize>,
}

/// Serves the booking-details read path: most recent completed session
/// first, then a storage scan fallback, then a pending-parts report.
#[derive(Debug, Clone)]
pub struct ImageryLookup {
    registry: Arc<dyn SessionRegistry>,
    store: Arc<dyn ObjectStore>,
    presign_expiry: Duration,
}

impl ImageryLookup {
    /// Create a new imagery lookup.
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        store: Arc<dyn ObjectStore>,
        presign_expiry: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            presign_expiry,
        }
    }

    /// Report the imagery available for a booking.
    pub async fn lookup(&self, booking_id: &str) -> AppResult<ImageryReport> {
        // 1. The registry's most recent completed session.
        if let Some(session) = self.registry.latest_completed_for_booking(booking_id).await? {
            if let Some(url) = session.reassembled_url.clone() {
                return Ok(ImageryReport {
                    state: ImageryState::Ready,
                    resource_id: session.final_resource_id,
                    file_name: Some(session.original_file_name),
                    url: Some(url),
                    pending_parts: None,
                });
            }
        }

        // 2. Fall back to scanning the booking prefix for any finished
        //    raster object.
        let objects = self.store.list(&format!("{booking_id}/")).await?;
        let mut finished: Vec<&String> = objects
            .iter()
            .map(|meta| &meta.key)
            .filter(|key| is_finished_geotiff(key))
            .collect();
        // Reassembled outputs sort behind raw uploads only by name; prefer
        // the newest-looking key.
        finished.sort();
        if let Some(key) = finished.last() {
            debug!(booking_id, key = %key, "Serving imagery from storage scan");
            let url = self.store.presign_get(key, self.presign_expiry).await?;
            return Ok(ImageryReport {
                state: ImageryState::Ready,
                resource_id: None,
                file_name: Some(key_filename(key).to_string()),
                url: Some(url),
                pending_parts: None,
            });
        }

        // 3. Unassembled parts: report pending rather than failing.
        let pending_parts = objects
            .iter()
            .filter(|meta| extract_part_index(&meta.key).is_some())
            .count();
        if pending_parts > 0 {
            return Ok(ImageryReport {
                state: ImageryState::PendingReassembly,
                resource_id: None,
                file_name: None,
                url: None,
                pending_parts: Some(pending_parts),
            });
        }

        Ok(ImageryReport {
            state: ImageryState::Missing,
            resource_id: None,
            file_name: None,
            url: None,
            pending_parts: None,
        })
    }
}

/// A finished raster object: `.tif`/`.tiff` extension, not a chunk part,
/// not a manifest.
fn is_finished_geotiff(key: &str) -> bool {
    let lower = key.to_lowercase();
    (lower.ends_with(".tif") || lower.ends_with(".tiff"))
        && extract_part_index(key).is_none()
        && !ChunkManifest::is_manifest_key(key)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use geostitch_core::traits::object_store::PutOptions;
    use geostitch_entity::mock::MemorySessionRegistry;
    use geostitch_entity::registry::SessionRegistry as _;
    use geostitch_entity::session::NewUploadSession;
    use geostitch_storage::providers::local::LocalObjectStore;

    use super::*;

    async fn lookup_fixture() -> (
        tempfile::TempDir,
        Arc<dyn ObjectStore>,
        Arc<MemorySessionRegistry>,
        ImageryLookup,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let registry = Arc::new(MemorySessionRegistry::new());
        let lookup = ImageryLookup::new(
            registry.clone(),
            Arc::clone(&store),
            Duration::from_secs(3600),
        );
        (dir, store, registry, lookup)
    }

    #[tokio::test]
    async fn test_completed_session_wins() {
        let (_dir, _store, registry, lookup) = lookup_fixture().await;
        registry
            .upsert_pending(&NewUploadSession {
                booking_id: "bk-1".into(),
                session_id: "1700".into(),
                original_file_name: "site.tif".into(),
                total_chunks: 2,
                checksum: None,
                manifest_key: None,
            })
            .await
            .unwrap();
        let resource_id = Uuid::new_v4();
        registry
            .complete_if_pending("bk-1", "1700", resource_id, "https://example/survey")
            .await
            .unwrap();

        let report = lookup.lookup("bk-1").await.unwrap();
        assert_eq!(report.state, ImageryState::Ready);
        assert_eq!(report.resource_id, Some(resource_id));
        assert_eq!(report.url.as_deref(), Some("https://example/survey"));
    }

    #[tokio::test]
    async fn test_storage_scan_fallback() {
        let (_dir, store, _registry, lookup) = lookup_fixture().await;
        store
            .put(
                "bk-1/reassembled_abc_site.tif",
                Bytes::from_static(b"raster"),
                PutOptions::default(),
            )
            .await
            .unwrap();

        let report = lookup.lookup("bk-1").await.unwrap();
        assert_eq!(report.state, ImageryState::Ready);
        assert!(report.resource_id.is_none());
        assert_eq!(report.file_name.as_deref(), Some("reassembled_abc_site.tif"));
        assert!(report.url.unwrap().starts_with("file://"));
    }

    #[tokio::test]
    async fn test_only_parts_reports_pending() {
        let (_dir, store, _registry, lookup) = lookup_fixture().await;
        for i in 0..3 {
            store
                .put(
                    &format!("bk-1/1700/site.tif.part{i}"),
                    Bytes::from_static(b"x"),
                    PutOptions::default(),
                )
                .await
                .unwrap();
        }

        let report = lookup.lookup("bk-1").await.unwrap();
        assert_eq!(report.state, ImageryState::PendingReassembly);
        assert_eq!(report.pending_parts, Some(3));
    }

    #[tokio::test]
    async fn test_nothing_reports_missing() {
        let (_dir, _store, _registry, lookup) = lookup_fixture().await;
        let report = lookup.lookup("bk-1").await.unwrap();
        assert_eq!(report.state, ImageryState::Missing);
    }
}

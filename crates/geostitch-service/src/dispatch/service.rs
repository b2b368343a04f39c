//! Per-session reassembly orchestration.

use std::sync::Arc;

use tracing::{info, warn};

use geostitch_core::error::ErrorKind;
use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_entity::manifest::ChunkManifest;
use geostitch_entity::registry::SessionRegistry;
use geostitch_entity::session::{SessionStatus, UploadSession};
use geostitch_storage::chunked::assembler::ReassemblyEngine;
use geostitch_storage::chunked::completion::CompletionChecker;
use geostitch_storage::chunked::locator::ChunkLocator;
use geostitch_storage::chunked::manifest::ManifestResolver;

use crate::finalizer::Finalizer;

use super::{parse_manifest_key, ReassemblyResponse};

/// Parameters for one reassembly attempt.
#[derive(Debug, Clone)]
pub struct ReassembleParams {
    /// The booking whose upload should be reassembled.
    pub booking_id: String,
    /// Session identifier to examine.
    pub session_id: String,
    /// Manifest key override; defaults to the conventional layout.
    pub manifest_key: Option<String>,
    /// Output filename override.
    pub base_file_name: Option<String>,
    /// Whether a failed session may be retried as a fresh attempt
    /// (direct requests only).
    pub allow_recovery: bool,
}

/// Runs the reassembly pipeline for one session: manifest resolution,
/// chunk discovery, completion checking, assembly, and finalization.
#[derive(Debug, Clone)]
pub struct ReassemblyService {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn SessionRegistry>,
    resolver: ManifestResolver,
    locator: ChunkLocator,
    checker: CompletionChecker,
    engine: ReassemblyEngine,
    finalizer: Finalizer,
}

impl ReassemblyService {
    /// Create a new reassembly service from its pipeline components.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn SessionRegistry>,
        resolver: ManifestResolver,
        locator: ChunkLocator,
        checker: CompletionChecker,
        engine: ReassemblyEngine,
        finalizer: Finalizer,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
            locator,
            checker,
            engine,
            finalizer,
        }
    }

    /// Run one reassembly attempt.
    ///
    /// Not-yet-complete sessions report `success = false` without failing
    /// the session (the sweep retries them); unrecoverable conditions mark
    /// the session failed and propagate the error to the dispatcher
    /// boundary.
    pub async fn reassemble(&self, params: ReassembleParams) -> AppResult<ReassemblyResponse> {
        let booking_id = params.booking_id.clone();
        let manifest_key = params
            .manifest_key
            .clone()
            .unwrap_or_else(|| ChunkManifest::storage_key(&booking_id, &params.session_id));

        // Manifest absence is not an error; discovery fills the gap.
        let stored_manifest = self.resolver.resolve(&manifest_key).await;

        let mut session: Option<UploadSession> = None;
        if let Some(manifest) = &stored_manifest {
            // Key the row by the requested session identifier even when a
            // hand-edited manifest disagrees with its own storage key.
            let mut manifest = manifest.clone();
            manifest.session_id = params.session_id.clone();
            let row = self
                .resolver
                .register(&booking_id, &manifest, Some(manifest_key.clone()))
                .await?;
            // A finalized session needs no discovery work at all.
            if row.session_status() == SessionStatus::Completed {
                return Ok(ReassemblyResponse::already_finalized(
                    &booking_id,
                    Some(&row),
                ));
            }
            session = Some(row);
        }

        let chunks = match self.locator.locate(&booking_id, &params.session_id).await {
            Ok(chunks) => chunks,
            Err(e) if matches!(e.kind, ErrorKind::NoChunksFound | ErrorKind::Assembly) => {
                let marked = self
                    .registry
                    .fail_if_pending(&booking_id, &params.session_id, &e.message)
                    .await
                    .unwrap_or(false);
                if marked {
                    warn!(
                        booking_id = %booking_id,
                        session_id = %params.session_id,
                        error = %e.message,
                        "Session marked failed"
                    );
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // Sessions discovered without a manifest get a synthesized
        // equivalent derived from the chunks themselves.
        let mut session = match session {
            Some(session) => session,
            None => {
                let manifest = ManifestResolver::synthesize(&params.session_id, &chunks);
                self.resolver.register(&booking_id, &manifest, None).await?
            }
        };

        let mut session_id = session.session_id.clone();
        match session.session_status() {
            SessionStatus::Completed => {
                return Ok(ReassemblyResponse::already_finalized(
                    &booking_id,
                    Some(&session),
                ));
            }
            SessionStatus::Failed if params.allow_recovery => {
                // A failed session never leaves its terminal state; a manual
                // re-trigger becomes a fresh, independently tracked attempt.
                let recovery_id = chrono::Utc::now().timestamp_millis().to_string();
                let mut manifest = stored_manifest
                    .clone()
                    .unwrap_or_else(|| ManifestResolver::synthesize(&session_id, &chunks));
                manifest.session_id = recovery_id.clone();
                session = self
                    .resolver
                    .register(&booking_id, &manifest, Some(manifest_key.clone()))
                    .await?;
                info!(
                    booking_id = %booking_id,
                    failed_session = %session_id,
                    recovery_session = %recovery_id,
                    "Retrying failed session as a fresh attempt"
                );
                session_id = recovery_id;
            }
            SessionStatus::Failed => {
                return Ok(ReassemblyResponse::note(
                    false,
                    format!(
                        "Session {session_id} previously failed: {}",
                        session.error_message.as_deref().unwrap_or("unknown error")
                    ),
                ));
            }
            SessionStatus::Pending => {}
        }

        if !self.checker.is_complete(&session, &chunks).await? {
            let refreshed = self
                .registry
                .find(&booking_id, &session_id)
                .await?
                .unwrap_or(session);
            return Ok(ReassemblyResponse::note(
                false,
                format!(
                    "Session {session_id} not yet complete ({} of {} chunks present)",
                    refreshed.chunks_uploaded, refreshed.total_chunks
                ),
            ));
        }

        let file_name_source = params
            .base_file_name
            .as_deref()
            .unwrap_or(&session.original_file_name);

        let assembled = match self
            .engine
            .assemble(&booking_id, file_name_source, &chunks)
            .await
        {
            Ok(assembled) => assembled,
            Err(e) => {
                let marked = self
                    .registry
                    .fail_if_pending(&booking_id, &session_id, &e.message)
                    .await
                    .unwrap_or(false);
                if marked {
                    warn!(
                        booking_id = %booking_id,
                        session_id = %session_id,
                        error = %e.message,
                        "Session marked failed after assembly error"
                    );
                }
                return Err(e);
            }
        };

        self.finalizer
            .finalize(&booking_id, &session_id, &assembled)
            .await
    }

    /// The newest manifest session under a booking's prefix, when a direct
    /// request supplied no session identifier.
    pub async fn newest_manifest_session(&self, booking_id: &str) -> Option<String> {
        let objects = self.store.list(&format!("{booking_id}/")).await.ok()?;
        objects
            .iter()
            .filter_map(|meta| parse_manifest_key(&meta.key))
            .map(|(_, session_id)| session_id)
            .max_by(|a, b| cmp_session_ids(a, b))
    }
}

/// Compare session identifiers numerically when both parse, otherwise
/// lexicographically; time-derived identifiers sort newest-last either way.
fn cmp_session_ids(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i128>(), b.parse::<i128>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use std::time::Duration;

    use geostitch_core::traits::object_store::PutOptions;
    use geostitch_entity::mock::{MemoryResourceCatalog, MemorySessionRegistry};
    use geostitch_entity::registry::ResourceCatalog;
    use geostitch_storage::providers::local::LocalObjectStore;

    use crate::dispatch::TriggerDispatcher;

    use super::*;

    struct Harness {
        _dir: tempfile::TempDir,
        store: Arc<dyn ObjectStore>,
        registry: Arc<MemorySessionRegistry>,
        catalog: Arc<MemoryResourceCatalog>,
        service: Arc<ReassemblyService>,
        dispatcher: TriggerDispatcher,
    }

    /// Wire the full pipeline against a filesystem store and in-memory
    /// registries. `min_part_size` is scaled down so tests exercise both
    /// assembly strategies with small fixtures.
    async fn harness(min_part_size: u64) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let registry = Arc::new(MemorySessionRegistry::new());
        let catalog = Arc::new(MemoryResourceCatalog::new());

        let resolver = ManifestResolver::new(Arc::clone(&store), registry.clone());
        let locator = ChunkLocator::new(Arc::clone(&store));
        let checker = CompletionChecker::new(Arc::clone(&store), registry.clone());
        let engine = ReassemblyEngine::new(Arc::clone(&store), min_part_size);
        let finalizer = Finalizer::new(
            Arc::clone(&store),
            registry.clone(),
            catalog.clone(),
            Duration::from_secs(14 * 24 * 3600),
        );

        let service = Arc::new(ReassemblyService::new(
            Arc::clone(&store),
            registry.clone(),
            resolver,
            locator,
            checker,
            engine,
            finalizer,
        ));
        let dispatcher = TriggerDispatcher::new(Arc::clone(&service), registry.clone(), 25);

        Harness {
            _dir: dir,
            store,
            registry,
            catalog,
            service,
            dispatcher,
        }
    }

    async fn put(store: &Arc<dyn ObjectStore>, key: &str, data: &[u8]) {
        store
            .put(key, Bytes::copy_from_slice(data), PutOptions::default())
            .await
            .unwrap();
    }

    async fn put_manifest(store: &Arc<dyn ObjectStore>, booking: &str, session: &str, total: i32) {
        let manifest = format!(
            r#"{{"sessionId":"{session}","originalFileName":"site.tif","totalChunks":{total}}}"#
        );
        put(
            store,
            &ChunkManifest::storage_key(booking, session),
            manifest.as_bytes(),
        )
        .await;
    }

    #[tokio::test]
    async fn test_scenario_small_chunks_direct_assembly_exact_size() {
        // Four chunks, each below the multipart minimum: direct assembly,
        // output size is the exact sum of inputs.
        let h = harness(1024).await;
        put_manifest(&h.store, "bk-1", "1700", 4).await;
        for i in 0..4 {
            put(
                &h.store,
                &format!("bk-1/1700/site.tif.part{i}"),
                &vec![i as u8; 700],
            )
            .await;
        }

        let response = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" }))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.size, Some(4 * 700));
        assert_eq!(response.file_name.as_deref(), Some("site.tif"));
        let output = h.store.get(response.storage_key.as_ref().unwrap()).await.unwrap();
        assert_eq!(output.len(), 4 * 700);

        let session = h.registry.find("bk-1", "1700").await.unwrap().unwrap();
        assert_eq!(session.session_status(), SessionStatus::Completed);
        assert_eq!(session.final_resource_id, response.resource_id);
    }

    #[tokio::test]
    async fn test_scenario_no_manifest_path_prefix_discovery() {
        // No manifest anywhere; three part objects under the session
        // prefix are found, ordered by trailing digit, and reassembled.
        let h = harness(4096).await;
        put(&h.store, "bk-1/1700/test.tif.part1", b"bb").await;
        put(&h.store, "bk-1/1700/test.tif.part0", b"aa").await;
        put(&h.store, "bk-1/1700/test.tif.part2", b"cc").await;

        let response = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" }))
            .await
            .unwrap();

        assert!(response.success);
        let output = h.store.get(response.storage_key.as_ref().unwrap()).await.unwrap();
        assert_eq!(output, Bytes::from("aabbcc"));

        // The synthesized manifest recovered the original name.
        assert_eq!(response.file_name.as_deref(), Some("test.tif"));
    }

    #[tokio::test]
    async fn test_scenario_no_chunks_marks_session_failed() {
        let h = harness(1024).await;
        // Manifest exists so the session is registered, but no chunks ever
        // arrived.
        put_manifest(&h.store, "bk-1", "1700", 3).await;

        let err = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoChunksFound);

        let session = h.registry.find("bk-1", "1700").await.unwrap().unwrap();
        assert_eq!(session.session_status(), SessionStatus::Failed);
        assert!(!session.error_message.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_non_manifest_event_is_ignored() {
        let h = harness(1024).await;
        let response = h
            .dispatcher
            .dispatch(serde_json::json!({
                "Records": [{
                    "eventSource": "aws:s3",
                    "eventName": "ObjectCreated:Put",
                    "s3": {
                        "bucket": { "name": "uploads" },
                        "object": { "key": "bk-1/site.tif.part0" }
                    }
                }]
            }))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.message.contains("not a manifest file, ignoring"));
        // No session was registered and nothing was assembled.
        assert!(h.registry.find("bk-1", "1700").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manifest_event_triggers_reassembly() {
        let h = harness(4096).await;
        put_manifest(&h.store, "bk-1", "1700", 2).await;
        put(&h.store, "bk-1/1700/site.tif.part0", b"north").await;
        put(&h.store, "bk-1/1700/site.tif.part1", b"south").await;

        let response = h
            .dispatcher
            .dispatch(serde_json::json!({
                "Records": [{
                    "eventSource": "aws:s3",
                    "eventName": "ObjectCreated:Put",
                    "s3": {
                        "bucket": { "name": "uploads" },
                        "object": { "key": "bk-1/1700_manifest.json" }
                    }
                }]
            }))
            .await
            .unwrap();

        assert!(response.success);
        let output = h.store.get(response.storage_key.as_ref().unwrap()).await.unwrap();
        assert_eq!(output, Bytes::from("northsouth"));
    }

    #[tokio::test]
    async fn test_incomplete_session_reports_not_ready() {
        let h = harness(1024).await;
        put_manifest(&h.store, "bk-1", "1700", 3).await;
        put(&h.store, "bk-1/1700/site.tif.part0", b"only one").await;

        let response = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" }))
            .await
            .unwrap();

        assert!(!response.success);
        assert!(response.message.contains("1 of 3"));
        // Not a failure: the session stays pending for the sweep.
        let session = h.registry.find("bk-1", "1700").await.unwrap().unwrap();
        assert!(session.is_pending());
        assert_eq!(session.chunks_uploaded, 1);
    }

    #[tokio::test]
    async fn test_finalize_twice_creates_one_record() {
        let h = harness(1024).await;
        put_manifest(&h.store, "bk-1", "1700", 2).await;
        put(&h.store, "bk-1/1700/site.tif.part0", b"aa").await;
        put(&h.store, "bk-1/1700/site.tif.part1", b"bb").await;

        let payload = serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" });
        let first = h.dispatcher.dispatch(payload.clone()).await.unwrap();
        assert!(first.success);
        assert!(first.resource_id.is_some());

        // Second run short-circuits on the completed session.
        let second = h.dispatcher.dispatch(payload).await.unwrap();
        assert!(second.success);
        assert!(second.message.contains("already finalized"));

        assert_eq!(h.catalog.count_for_session("bk-1", "1700").await.unwrap(), 1);
        assert_eq!(h.catalog.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_completes_pending_sessions() {
        let h = harness(1024).await;
        put_manifest(&h.store, "bk-1", "1700", 2).await;
        put(&h.store, "bk-1/1700/site.tif.part0", b"aa").await;
        put(&h.store, "bk-1/1700/site.tif.part1", b"bb").await;

        // Register the session as the missed manifest event would have.
        h.service
            .reassemble(ReassembleParams {
                booking_id: "bk-1".into(),
                session_id: "1700".into(),
                manifest_key: None,
                base_file_name: None,
                allow_recovery: false,
            })
            .await
            .unwrap();
        // Force it back to the swept state by starting a second pending one.
        put_manifest(&h.store, "bk-2", "1800", 1).await;
        put(&h.store, "bk-2/1800/scan.tif.part0", b"solo").await;
        h.registry
            .upsert_pending(&geostitch_entity::session::NewUploadSession {
                booking_id: "bk-2".into(),
                session_id: "1800".into(),
                original_file_name: "scan.tif".into(),
                total_chunks: 1,
                checksum: None,
                manifest_key: None,
            })
            .await
            .unwrap();

        let response = h
            .dispatcher
            .dispatch(serde_json::json!({ "source": "scheduler" }))
            .await
            .unwrap();
        assert!(response.success);

        let swept = h.registry.find("bk-2", "1800").await.unwrap().unwrap();
        assert_eq!(swept.session_status(), SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_direct_request_without_session_id_uses_newest_manifest() {
        let h = harness(1024).await;
        put_manifest(&h.store, "bk-1", "1600", 1).await;
        put_manifest(&h.store, "bk-1", "1700", 1).await;
        put(&h.store, "bk-1/1700/site.tif.part0", b"latest").await;
        put(&h.store, "bk-1/1600/site.tif.part0", b"older").await;

        let response = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1" }))
            .await
            .unwrap();

        assert!(response.success);
        let output = h.store.get(response.storage_key.as_ref().unwrap()).await.unwrap();
        assert_eq!(output, Bytes::from("latest"));
    }

    #[tokio::test]
    async fn test_failed_session_direct_retry_runs_fresh_attempt() {
        let h = harness(1024).await;
        put_manifest(&h.store, "bk-1", "1700", 1).await;

        // First attempt fails: no chunks yet.
        let err = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoChunksFound);

        // Chunks arrive late; the operator re-triggers.
        put(&h.store, "bk-1/1700/site.tif.part0", b"late data").await;
        let response = h
            .dispatcher
            .dispatch(serde_json::json!({ "bookingId": "bk-1", "sessionId": "1700" }))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.resource_id.is_some());
        // The original session stays terminally failed; the retry ran as an
        // independent attempt.
        let original = h.registry.find("bk-1", "1700").await.unwrap().unwrap();
        assert_eq!(original.session_status(), SessionStatus::Failed);
        assert_eq!(h.catalog.all().await.len(), 1);
    }

    #[test]
    fn test_cmp_session_ids_is_numeric_aware() {
        use std::cmp::Ordering;
        assert_eq!(cmp_session_ids("900", "1700"), Ordering::Less);
        assert_eq!(cmp_session_ids("1700", "1700"), Ordering::Equal);
        assert_eq!(cmp_session_ids("abc", "abd"), Ordering::Less);
    }
}

//! Session completion checking.

use std::sync::Arc;

use tracing::debug;

use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_entity::manifest::ChunkManifest;
use geostitch_entity::registry::SessionRegistry;
use geostitch_entity::session::UploadSession;

use super::part_index::sort_chunk_keys;

/// Decides whether every expected chunk for a session is present and
/// accessible.
#[derive(Debug, Clone)]
pub struct CompletionChecker {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn SessionRegistry>,
}

impl CompletionChecker {
    /// Create a new completion checker.
    pub fn new(store: Arc<dyn ObjectStore>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Whether the session's chunks are all present and readable.
    ///
    /// Short-circuits on an already-satisfied stored count; otherwise
    /// recounts from the store (persisting the recount), and when the count
    /// meets the expected total, live-probes the first and last chunk in
    /// sorted order. Probe failures report "not yet consistent" — `false`,
    /// not an error — since object stores may exhibit read-after-write lag.
    ///
    /// `located` carries the discovery result for sessions whose chunks do
    /// not live under the conventional `{booking}/{session}` prefix.
    pub async fn is_complete(
        &self,
        session: &UploadSession,
        located: &[String],
    ) -> AppResult<bool> {
        if session.total_chunks < 1 {
            return Ok(false);
        }
        if session.has_all_chunks() {
            debug!(
                booking_id = %session.booking_id,
                session_id = %session.session_id,
                "Stored chunk count already satisfies the total"
            );
            return Ok(true);
        }

        let prefix = format!("{}/{}", session.booking_id, session.session_id);
        let mut chunks: Vec<String> = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .map(|meta| meta.key)
            .filter(|key| !ChunkManifest::is_manifest_key(key))
            .collect();

        // Chunks found by name/metadata/group heuristics live outside the
        // session prefix; fall back to the discovery result.
        if chunks.is_empty() {
            chunks = located.to_vec();
        }

        let count = chunks.len() as i32;
        self.registry
            .record_chunk_count(&session.booking_id, &session.session_id, count)
            .await?;

        if count < session.total_chunks {
            debug!(
                booking_id = %session.booking_id,
                session_id = %session.session_id,
                count,
                total = session.total_chunks,
                "Session incomplete"
            );
            return Ok(false);
        }

        // Probe ordering prefers part-index order; unorderable sets fall
        // back to lexicographic order, since the probe only needs existence.
        let sorted = sort_chunk_keys(&chunks).unwrap_or_else(|_| {
            let mut copy = chunks.clone();
            copy.sort();
            copy
        });

        let mut probes: Vec<&String> = vec![&sorted[0]];
        if sorted.len() > 1 {
            probes.push(&sorted[sorted.len() - 1]);
        }

        for key in probes {
            match self.store.exists(key).await {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    debug!(
                        booking_id = %session.booking_id,
                        session_id = %session.session_id,
                        key = %key,
                        "Chunk probe failed; treating session as not yet consistent"
                    );
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}

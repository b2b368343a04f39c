//! Chunk discovery across unreliable naming conventions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use geostitch_core::error::AppError;
use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::{ObjectMeta, ObjectStore};
use geostitch_entity::manifest::ChunkManifest;

use super::part_index::{key_filename, part_group_base, sort_chunk_keys};

/// Object metadata keys that may carry the uploader's session timestamp.
const TIMESTAMP_METADATA_KEYS: [&str; 2] = ["timestamp", "session-timestamp"];

/// One discovery strategy in the locator's fallback chain.
///
/// The chain order embodies a trust ranking over naming conventions, not a
/// hard constraint — construct the locator with a different chain to change
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    /// Keys whose path contains `{booking_id}/{session_id}`.
    SessionPrefix,
    /// Keys whose filename contains the session identifier.
    SessionNameMatch,
    /// Keys whose stored metadata timestamp equals the session identifier.
    /// Requires a per-object metadata fetch, so it only runs when the
    /// cheaper strategies found nothing.
    MetadataTimestamp,
    /// Last resort: group keys by trailing-`.partN` base name and elect
    /// the largest group as the best-guess session.
    PartGroupElection,
}

impl DiscoveryStrategy {
    /// Whether this strategy runs only when earlier ones found nothing.
    fn fallback_only(&self) -> bool {
        matches!(self, Self::MetadataTimestamp | Self::PartGroupElection)
    }
}

/// The default trust ranking.
pub const DEFAULT_STRATEGY_CHAIN: [DiscoveryStrategy; 4] = [
    DiscoveryStrategy::SessionPrefix,
    DiscoveryStrategy::SessionNameMatch,
    DiscoveryStrategy::MetadataTimestamp,
    DiscoveryStrategy::PartGroupElection,
];

/// Discovers the chunk keys belonging to an upload session.
#[derive(Debug, Clone)]
pub struct ChunkLocator {
    store: Arc<dyn ObjectStore>,
    chain: Vec<DiscoveryStrategy>,
}

impl ChunkLocator {
    /// Create a locator with the default strategy chain.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_chain(store, DEFAULT_STRATEGY_CHAIN.to_vec())
    }

    /// Create a locator with a custom strategy chain.
    pub fn with_chain(store: Arc<dyn ObjectStore>, chain: Vec<DiscoveryStrategy>) -> Self {
        Self { store, chain }
    }

    /// Locate the session's chunk keys, ordered by part index.
    ///
    /// Unions matches from the chain (deduplicated, fallback strategies only
    /// when earlier ones came up empty). Fails with `NoChunksFound` when
    /// every strategy comes up empty, and with an assembly error when a
    /// multi-chunk set has an unorderable key.
    pub async fn locate(&self, booking_id: &str, session_id: &str) -> AppResult<Vec<String>> {
        let candidates: Vec<ObjectMeta> = self
            .store
            .list(&format!("{booking_id}/"))
            .await?
            .into_iter()
            .filter(|meta| !ChunkManifest::is_manifest_key(&meta.key))
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut found: Vec<String> = Vec::new();

        for strategy in &self.chain {
            if strategy.fallback_only() && !found.is_empty() {
                continue;
            }

            let matched = match strategy {
                DiscoveryStrategy::SessionPrefix => {
                    self.by_session_path(&candidates, booking_id, session_id)
                }
                DiscoveryStrategy::SessionNameMatch => {
                    self.by_session_name(&candidates, session_id)
                }
                DiscoveryStrategy::MetadataTimestamp => {
                    self.by_metadata_timestamp(&candidates, session_id).await
                }
                DiscoveryStrategy::PartGroupElection => self.by_part_group(&candidates),
            };

            debug!(
                booking_id,
                session_id,
                strategy = ?strategy,
                matched = matched.len(),
                "Chunk discovery strategy evaluated"
            );

            for key in matched {
                if seen.insert(key.clone()) {
                    found.push(key);
                }
            }
        }

        if found.is_empty() {
            return Err(AppError::no_chunks_found(format!(
                "No chunk objects found for session {session_id} under booking {booking_id}"
            )));
        }

        let ordered = sort_chunk_keys(&found)?;
        info!(
            booking_id,
            session_id,
            chunks = ordered.len(),
            "Located session chunks"
        );
        Ok(ordered)
    }

    /// Strategy 1: the key path carries the `{booking}/{session}` pair.
    fn by_session_path(
        &self,
        candidates: &[ObjectMeta],
        booking_id: &str,
        session_id: &str,
    ) -> Vec<String> {
        let needle = format!("{booking_id}/{session_id}");
        candidates
            .iter()
            .filter(|meta| meta.key.contains(&needle))
            .map(|meta| meta.key.clone())
            .collect()
    }

    /// Strategy 2: the filename carries the session identifier.
    fn by_session_name(&self, candidates: &[ObjectMeta], session_id: &str) -> Vec<String> {
        candidates
            .iter()
            .filter(|meta| key_filename(&meta.key).contains(session_id))
            .map(|meta| meta.key.clone())
            .collect()
    }

    /// Strategy 3: per-object metadata fetch, matching the uploader's
    /// timestamp against the session identifier.
    async fn by_metadata_timestamp(
        &self,
        candidates: &[ObjectMeta],
        session_id: &str,
    ) -> Vec<String> {
        let mut matched = Vec::new();
        for candidate in candidates {
            let head = match self.store.head(&candidate.key).await {
                Ok(head) => head,
                Err(e) => {
                    warn!(key = %candidate.key, error = %e, "Metadata probe failed; skipping key");
                    continue;
                }
            };
            let hit = TIMESTAMP_METADATA_KEYS
                .iter()
                .any(|k| head.metadata.get(*k).map(String::as_str) == Some(session_id));
            if hit {
                matched.push(candidate.key.clone());
            }
        }
        matched
    }

    /// Strategy 4: elect the largest trailing-`.partN` family.
    fn by_part_group(&self, candidates: &[ObjectMeta]) -> Vec<String> {
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for candidate in candidates {
            if let Some(base) = part_group_base(&candidate.key) {
                groups.entry(base).or_default().push(candidate.key.clone());
            }
        }

        groups
            .into_iter()
            // Deterministic tie-break: larger group wins, then earlier base.
            .max_by(|(base_a, a), (base_b, b)| a.len().cmp(&b.len()).then(base_b.cmp(base_a)))
            .map(|(_, keys)| keys)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;

    use geostitch_core::error::ErrorKind;
    use geostitch_core::traits::object_store::PutOptions;

    use crate::providers::local::LocalObjectStore;

    use super::*;

    async fn seeded_store(keys: &[&str]) -> (tempfile::TempDir, Arc<dyn ObjectStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_str().unwrap())
            .await
            .unwrap();
        for key in keys {
            store
                .put(key, Bytes::from_static(b"chunk"), PutOptions::default())
                .await
                .unwrap();
        }
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn test_session_path_strategy() {
        let (_dir, store) = seeded_store(&[
            "bk-1/1700/test.tif.part0",
            "bk-1/1700/test.tif.part1",
            "bk-1/1700/test.tif.part2",
            "bk-1/1700_manifest.json",
            "bk-1/unrelated/other.tif.part0",
        ])
        .await;

        let locator = ChunkLocator::new(store);
        let chunks = locator.locate("bk-1", "1700").await.unwrap();
        assert_eq!(
            chunks,
            vec![
                "bk-1/1700/test.tif.part0",
                "bk-1/1700/test.tif.part1",
                "bk-1/1700/test.tif.part2"
            ]
        );
    }

    #[tokio::test]
    async fn test_session_name_strategy_unions_with_path() {
        let (_dir, store) = seeded_store(&[
            "bk-1/1700/test.tif.part0",
            "bk-1/stray_1700_test.tif.part1",
        ])
        .await;

        let locator = ChunkLocator::new(store);
        let chunks = locator.locate("bk-1", "1700").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "bk-1/1700/test.tif.part0");
    }

    #[tokio::test]
    async fn test_metadata_strategy_runs_only_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );

        let mut metadata = HashMap::new();
        metadata.insert("timestamp".to_string(), "1700".to_string());
        store
            .put(
                "bk-1/oddly_named.tif.part0",
                Bytes::from_static(b"chunk"),
                PutOptions {
                    content_type: None,
                    metadata,
                },
            )
            .await
            .unwrap();
        store
            .put(
                "bk-1/untagged.tif.part0",
                Bytes::from_static(b"chunk"),
                PutOptions::default(),
            )
            .await
            .unwrap();

        let locator = ChunkLocator::new(store);
        let chunks = locator.locate("bk-1", "1700").await.unwrap();
        assert_eq!(chunks, vec!["bk-1/oddly_named.tif.part0"]);
    }

    #[tokio::test]
    async fn test_part_group_election_picks_largest_family() {
        let (_dir, store) = seeded_store(&[
            "bk-1/small.tif.part0",
            "bk-1/big.tif.part0",
            "bk-1/big.tif.part1",
            "bk-1/big.tif.part2",
            "bk-1/loose_notes.txt",
        ])
        .await;

        let locator = ChunkLocator::new(store);
        // Session id matches nothing; election is the only strategy left.
        let chunks = locator.locate("bk-1", "9999").await.unwrap();
        assert_eq!(
            chunks,
            vec!["bk-1/big.tif.part0", "bk-1/big.tif.part1", "bk-1/big.tif.part2"]
        );
    }

    #[tokio::test]
    async fn test_no_chunks_anywhere() {
        let (_dir, store) = seeded_store(&["bk-2/elsewhere.tif.part0"]).await;
        let locator = ChunkLocator::new(store);
        let err = locator.locate("bk-1", "1700").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoChunksFound);
    }

    #[tokio::test]
    async fn test_custom_chain_order() {
        let (_dir, store) = seeded_store(&["bk-1/1700/test.tif.part0"]).await;
        let locator = ChunkLocator::with_chain(
            store,
            vec![DiscoveryStrategy::SessionNameMatch, DiscoveryStrategy::SessionPrefix],
        );
        let chunks = locator.locate("bk-1", "1700").await.unwrap();
        assert_eq!(chunks, vec!["bk-1/1700/test.tif.part0"]);
    }
}

//! Stale-multipart janitor job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use tracing;

use geostitch_core::traits::object_store::ObjectStore;

use crate::executor::{JobExecutionError, JobHandler};

/// Aborts multipart uploads abandoned by dead invocations.
///
/// A reassembly cut down by the platform's execution limit can leave an
/// incomplete multipart upload holding storage; nothing inside a single
/// invocation can clean that up, so this job sweeps them on a schedule.
#[derive(Debug)]
pub struct MultipartJanitorHandler {
    /// Object store to sweep.
    store: Arc<dyn ObjectStore>,
    /// Uploads older than this are aborted.
    max_age: Duration,
}

impl MultipartJanitorHandler {
    /// Create a new janitor with the given age cutoff in hours.
    pub fn new(store: Arc<dyn ObjectStore>, max_age_hours: i64) -> Self {
        Self {
            store,
            max_age: Duration::hours(max_age_hours),
        }
    }
}

#[async_trait]
impl JobHandler for MultipartJanitorHandler {
    fn job_type(&self) -> &str {
        "multipart_janitor"
    }

    async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
        let uploads = self
            .store
            .list_multipart_uploads()
            .await
            .map_err(|e| JobExecutionError::Transient(format!("Upload listing failed: {e}")))?;

        let cutoff = Utc::now() - self.max_age;
        let mut aborted = 0usize;
        let mut kept = 0usize;

        for upload in uploads {
            let Some(initiated_at) = upload.initiated_at else {
                tracing::warn!(
                    key = %upload.key,
                    upload_id = %upload.upload_id,
                    "Multipart upload has no initiation time; skipping"
                );
                kept += 1;
                continue;
            };

            if initiated_at >= cutoff {
                kept += 1;
                continue;
            }

            match self
                .store
                .abort_multipart_upload(&upload.key, &upload.upload_id)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        key = %upload.key,
                        upload_id = %upload.upload_id,
                        age_hours = (Utc::now() - initiated_at).num_hours(),
                        "Aborted stale multipart upload"
                    );
                    aborted += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        key = %upload.key,
                        upload_id = %upload.upload_id,
                        error = %e,
                        "Failed to abort stale multipart upload"
                    );
                    kept += 1;
                }
            }
        }

        tracing::info!(aborted, kept, "Multipart janitor finished");
        Ok(Some(serde_json::json!({
            "task": "multipart_janitor",
            "aborted": aborted,
            "kept": kept,
        })))
    }
}

#[cfg(test)]
mod tests {
    use geostitch_storage::providers::local::LocalObjectStore;

    use super::*;

    #[tokio::test]
    async fn test_janitor_aborts_uploads_past_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        store
            .create_multipart_upload("bk-1/out.tif", None)
            .await
            .unwrap();

        // Zero-hour cutoff: everything initiated before "now" is stale.
        let janitor = MultipartJanitorHandler::new(Arc::clone(&store), 0);
        let result = janitor.execute().await.unwrap().unwrap();
        assert_eq!(result["aborted"], 1);
        assert!(store.list_multipart_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_janitor_keeps_fresh_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(
            LocalObjectStore::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        store
            .create_multipart_upload("bk-1/out.tif", None)
            .await
            .unwrap();

        let janitor = MultipartJanitorHandler::new(Arc::clone(&store), 24);
        let result = janitor.execute().await.unwrap().unwrap();
        assert_eq!(result["aborted"], 0);
        assert_eq!(result["kept"], 1);
        assert_eq!(store.list_multipart_uploads().await.unwrap().len(), 1);
    }
}

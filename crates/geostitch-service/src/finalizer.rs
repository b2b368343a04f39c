//! Finalization of assembled objects.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use geostitch_core::result::AppResult;
use geostitch_core::traits::object_store::ObjectStore;
use geostitch_entity::registry::{ResourceCatalog, SessionRegistry};
use geostitch_entity::resource::NewResourceRecord;
use geostitch_storage::chunked::assembler::{AssembledObject, GEOTIFF_CONTENT_TYPE};

use crate::dispatch::ReassemblyResponse;

/// Records a successful assembly: verifies the output object, mints its
/// retrieval URL, completes the session, and registers the resource record.
#[derive(Debug, Clone)]
pub struct Finalizer {
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn SessionRegistry>,
    catalog: Arc<dyn ResourceCatalog>,
    presign_expiry: Duration,
}

impl Finalizer {
    /// Create a new finalizer.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn SessionRegistry>,
        catalog: Arc<dyn ResourceCatalog>,
        presign_expiry: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            catalog,
            presign_expiry,
        }
    }

    /// Finalize one assembled object.
    ///
    /// Idempotent per session: the pending → completed transition is a
    /// conditional update, and only the invocation that wins it writes the
    /// resource record. A session already finalized by a racing invocation
    /// short-circuits with its stored result.
    ///
    /// A resource-record write failure after the session completed is logged
    /// and tolerated — the assembled object is durable and its URL is
    /// already linked to the session, so the caller still receives success.
    pub async fn finalize(
        &self,
        booking_id: &str,
        session_id: &str,
        assembled: &AssembledObject,
    ) -> AppResult<ReassemblyResponse> {
        let head = self.store.head(&assembled.output_key).await?;
        let size = head.size_bytes as i64;

        let url = self
            .store
            .presign_get(&assembled.output_key, self.presign_expiry)
            .await?;

        let won = self
            .registry
            .complete_if_pending(booking_id, session_id, assembled.resource_id, &url)
            .await?;

        if !won {
            info!(
                booking_id,
                session_id,
                "Session already finalized; skipping resource record creation"
            );
            let existing = self.registry.find(booking_id, session_id).await?;
            return Ok(ReassemblyResponse::already_finalized(
                booking_id,
                existing.as_ref(),
            ));
        }

        let record = NewResourceRecord {
            id: assembled.resource_id,
            booking_id: booking_id.to_string(),
            session_id: session_id.to_string(),
            file_name: assembled.file_name.clone(),
            content_type: GEOTIFF_CONTENT_TYPE.to_string(),
            storage_key: assembled.output_key.clone(),
            url: url.clone(),
            size_bytes: size,
        };

        if let Err(e) = self.catalog.create(&record).await {
            // The assembled object is durable; losing the secondary record
            // must not fail the operation or delete completed work.
            warn!(
                booking_id,
                session_id,
                resource_id = %assembled.resource_id,
                error = %e,
                "Resource record write failed after successful assembly"
            );
        }

        info!(
            booking_id,
            session_id,
            resource_id = %assembled.resource_id,
            output_key = %assembled.output_key,
            size,
            "Reassembly finalized"
        );

        Ok(ReassemblyResponse::completed(
            booking_id,
            assembled,
            &url,
            size,
        ))
    }
}

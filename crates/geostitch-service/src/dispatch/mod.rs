//! Trigger classification and dispatch.
//!
//! Every invocation payload is classified into exactly one of three shapes —
//! a direct request, a storage-event notification, or a periodic sweep —
//! and routed through the reassembly pipeline. All failures are converted
//! into the structured response at this boundary.

mod service;

pub use service::{ReassembleParams, ReassemblyService};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use geostitch_core::error::AppError;
use geostitch_core::events::storage::StorageEventNotification;
use geostitch_core::result::AppResult;
use geostitch_entity::manifest::ChunkManifest;
use geostitch_entity::registry::SessionRegistry;
use geostitch_entity::session::UploadSession;
use geostitch_storage::chunked::assembler::AssembledObject;

/// A direct reassembly request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectRequest {
    /// The booking whose upload should be reassembled.
    pub booking_id: String,
    /// Session identifier, when the caller knows it.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Manifest object key, when the caller knows it.
    #[serde(default)]
    pub manifest_key: Option<String>,
    /// Resource identifier of a prior attempt (accepted for compatibility).
    #[serde(default)]
    pub final_resource_id: Option<String>,
    /// Overrides the output file name derivation.
    #[serde(default)]
    pub base_file_name: Option<String>,
    /// Resource type hint (accepted for compatibility; always geotiff).
    #[serde(default)]
    pub resource_type: Option<String>,
}

/// The three recognized trigger shapes.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// An explicit request naming a booking.
    Direct(DirectRequest),
    /// An object-created notification from the store.
    StorageEvent(StorageEventNotification),
    /// A scheduled sweep with no identifiers.
    Sweep,
}

/// Structured result returned for every trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassemblyResponse {
    /// Whether the requested work succeeded (or was a routine no-op).
    pub success: bool,
    /// Human-readable outcome description.
    pub message: String,
    /// Identifier of the produced resource record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    /// Clean output filename.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Retrieval URL of the assembled object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Object key of the assembled file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    /// The booking the work applied to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    /// Assembled size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl ReassemblyResponse {
    /// A plain informational outcome with no resource payload.
    pub fn note(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            message: message.into(),
            resource_id: None,
            file_name: None,
            url: None,
            storage_key: None,
            booking_id: None,
            size: None,
        }
    }

    /// Successful completion of a fresh assembly.
    pub fn completed(
        booking_id: &str,
        assembled: &AssembledObject,
        url: &str,
        size: i64,
    ) -> Self {
        Self {
            success: true,
            message: "Reassembly completed".to_string(),
            resource_id: Some(assembled.resource_id),
            file_name: Some(assembled.file_name.clone()),
            url: Some(url.to_string()),
            storage_key: Some(assembled.output_key.clone()),
            booking_id: Some(booking_id.to_string()),
            size: Some(size),
        }
    }

    /// The session was finalized by an earlier or racing invocation.
    pub fn already_finalized(booking_id: &str, session: Option<&UploadSession>) -> Self {
        Self {
            success: true,
            message: "Session already finalized".to_string(),
            resource_id: session.and_then(|s| s.final_resource_id),
            file_name: session.map(|s| s.original_file_name.clone()),
            url: session.and_then(|s| s.reassembled_url.clone()),
            storage_key: None,
            booking_id: Some(booking_id.to_string()),
            size: None,
        }
    }
}

/// Classify an invocation payload into exactly one trigger shape.
pub fn classify(payload: &Value) -> AppResult<Trigger> {
    let Some(object) = payload.as_object() else {
        return Err(AppError::unrecognized_trigger(
            "Trigger payload is not a JSON object",
        ));
    };

    // Storage-event shape: an S3-style Records array.
    if object.contains_key("Records") {
        let notification: StorageEventNotification =
            serde_json::from_value(payload.clone()).map_err(|e| {
                AppError::unrecognized_trigger(format!("Malformed storage event: {e}"))
            })?;
        return Ok(Trigger::StorageEvent(notification));
    }

    // Scheduled-sweep marker.
    let source = object.get("source").and_then(Value::as_str);
    if source == Some("scheduler") || source == Some("aws.events") {
        return Ok(Trigger::Sweep);
    }

    // Direct shape: identified by its characteristic fields.
    let direct_shaped = object.contains_key("bookingId")
        || object.contains_key("sessionId")
        || object.contains_key("manifestKey")
        || object.contains_key("baseFileName");
    if direct_shaped {
        let request: DirectRequest = serde_json::from_value(payload.clone())
            .map_err(|_| AppError::validation("Direct request is missing bookingId"))?;
        if request.booking_id.trim().is_empty() {
            return Err(AppError::validation("Direct request is missing bookingId"));
        }
        return Ok(Trigger::Direct(request));
    }

    Err(AppError::unrecognized_trigger(
        "Trigger payload matches no known shape",
    ))
}

/// Routes classified triggers into the reassembly service.
#[derive(Debug, Clone)]
pub struct TriggerDispatcher {
    service: Arc<ReassemblyService>,
    registry: Arc<dyn SessionRegistry>,
    sweep_batch_size: i64,
}

impl TriggerDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        service: Arc<ReassemblyService>,
        registry: Arc<dyn SessionRegistry>,
        sweep_batch_size: i64,
    ) -> Self {
        Self {
            service,
            registry,
            sweep_batch_size,
        }
    }

    /// Classify and execute one invocation payload.
    pub async fn dispatch(&self, payload: Value) -> AppResult<ReassemblyResponse> {
        match classify(&payload)? {
            Trigger::Direct(request) => self.handle_direct(request).await,
            Trigger::StorageEvent(notification) => self.handle_storage_event(notification).await,
            Trigger::Sweep => self.sweep().await,
        }
    }

    /// Direct request: reassemble one session, resolving the session
    /// identifier when the caller did not supply it.
    async fn handle_direct(&self, request: DirectRequest) -> AppResult<ReassemblyResponse> {
        let session_id = match self.resolve_session_id(&request).await {
            Some(session_id) => session_id,
            // No manifest anywhere: mint a fresh time-derived session so
            // the attempt is tracked; discovery will fall back to part
            // grouping.
            None => chrono::Utc::now().timestamp_millis().to_string(),
        };

        self.service
            .reassemble(ReassembleParams {
                booking_id: request.booking_id.clone(),
                session_id,
                manifest_key: request.manifest_key.clone(),
                base_file_name: request.base_file_name.clone(),
                allow_recovery: true,
            })
            .await
    }

    /// Storage event: only manifest objects trigger work; anything else is
    /// routine event traffic and acknowledged as a no-op.
    async fn handle_storage_event(
        &self,
        notification: StorageEventNotification,
    ) -> AppResult<ReassemblyResponse> {
        let Some(record) = notification
            .records
            .iter()
            .find(|record| record.is_object_created())
        else {
            return Ok(ReassemblyResponse::note(
                true,
                "No object-created records in event; ignoring",
            ));
        };

        let key = record.decoded_key();
        if !ChunkManifest::is_manifest_key(&key) {
            return Ok(ReassemblyResponse::note(
                true,
                format!("Object '{key}' is not a manifest file, ignoring"),
            ));
        }

        let Some((booking_id, session_id)) = parse_manifest_key(&key) else {
            return Err(AppError::validation(format!(
                "Manifest key '{key}' does not follow the booking/session layout"
            )));
        };

        info!(
            booking_id = %booking_id,
            session_id = %session_id,
            key = %key,
            "Manifest event received"
        );
        self.service
            .reassemble(ReassembleParams {
                booking_id,
                session_id,
                manifest_key: Some(key),
                base_file_name: None,
                allow_recovery: false,
            })
            .await
    }

    /// Periodic sweep: re-examine pending sessions whose triggering event
    /// was missed or whose chunks completed after the manifest event.
    async fn sweep(&self) -> AppResult<ReassemblyResponse> {
        let pending = self.registry.list_pending(self.sweep_batch_size).await?;
        let examined = pending.len();
        let mut completed = 0usize;

        for session in pending {
            let result = self
                .service
                .reassemble(ReassembleParams {
                    booking_id: session.booking_id.clone(),
                    session_id: session.session_id.clone(),
                    manifest_key: session.manifest_key.clone(),
                    base_file_name: None,
                    allow_recovery: false,
                })
                .await;

            match result {
                Ok(response) if response.resource_id.is_some() => completed += 1,
                Ok(_) => {}
                Err(e) => {
                    // One bad session must not starve the rest of the sweep.
                    warn!(
                        booking_id = %session.booking_id,
                        session_id = %session.session_id,
                        error = %e,
                        "Sweep attempt failed for session"
                    );
                }
            }
        }

        info!(examined, completed, "Sweep finished");
        Ok(ReassemblyResponse::note(
            true,
            format!("Sweep examined {examined} pending sessions, completed {completed}"),
        ))
    }

    /// Resolve the session identifier for a direct request: explicit value,
    /// then the manifest key, then the newest manifest under the booking.
    async fn resolve_session_id(&self, request: &DirectRequest) -> Option<String> {
        if let Some(session_id) = &request.session_id {
            return Some(session_id.clone());
        }
        if let Some(manifest_key) = &request.manifest_key {
            if let Some((_, session_id)) = parse_manifest_key(manifest_key) {
                return Some(session_id);
            }
        }
        self.service
            .newest_manifest_session(&request.booking_id)
            .await
    }
}

/// Split `{booking}/{session}_manifest.json` into its identifiers.
pub fn parse_manifest_key(key: &str) -> Option<(String, String)> {
    let (booking_id, file_name) = key.rsplit_once('/')?;
    let session_id = file_name.strip_suffix("_manifest.json")?;
    if booking_id.is_empty() || session_id.is_empty() {
        return None;
    }
    Some((booking_id.to_string(), session_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_direct() {
        let trigger = classify(&serde_json::json!({
            "bookingId": "bk-1",
            "sessionId": "1700"
        }))
        .unwrap();
        match trigger {
            Trigger::Direct(request) => {
                assert_eq!(request.booking_id, "bk-1");
                assert_eq!(request.session_id.as_deref(), Some("1700"));
            }
            other => panic!("expected direct trigger, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_direct_without_booking_is_invalid() {
        let err = classify(&serde_json::json!({ "sessionId": "1700" })).unwrap_err();
        assert_eq!(err.kind, geostitch_core::error::ErrorKind::Validation);

        let err = classify(&serde_json::json!({ "bookingId": "  " })).unwrap_err();
        assert_eq!(err.kind, geostitch_core::error::ErrorKind::Validation);
    }

    #[test]
    fn test_classify_storage_event() {
        let trigger = classify(&serde_json::json!({
            "Records": [{
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": "uploads" },
                    "object": { "key": "bk-1/1700_manifest.json" }
                }
            }]
        }))
        .unwrap();
        assert!(matches!(trigger, Trigger::StorageEvent(_)));
    }

    #[test]
    fn test_classify_sweep() {
        assert!(matches!(
            classify(&serde_json::json!({ "source": "scheduler" })).unwrap(),
            Trigger::Sweep
        ));
        assert!(matches!(
            classify(&serde_json::json!({ "source": "aws.events", "detail-type": "Scheduled Event" }))
                .unwrap(),
            Trigger::Sweep
        ));
    }

    #[test]
    fn test_classify_unknown_shape() {
        let err = classify(&serde_json::json!({ "hello": "world" })).unwrap_err();
        assert_eq!(
            err.kind,
            geostitch_core::error::ErrorKind::UnrecognizedTrigger
        );

        let err = classify(&serde_json::json!("just a string")).unwrap_err();
        assert_eq!(
            err.kind,
            geostitch_core::error::ErrorKind::UnrecognizedTrigger
        );
    }

    #[test]
    fn test_parse_manifest_key() {
        assert_eq!(
            parse_manifest_key("bk-1/1700_manifest.json"),
            Some(("bk-1".to_string(), "1700".to_string()))
        );
        assert_eq!(
            parse_manifest_key("nested/bk-1/1700_manifest.json"),
            Some(("nested/bk-1".to_string(), "1700".to_string()))
        );
        assert_eq!(parse_manifest_key("no-slash_manifest.json"), None);
        assert_eq!(parse_manifest_key("bk-1/notamanifest.txt"), None);
    }
}

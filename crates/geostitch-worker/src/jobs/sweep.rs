//! Pending-session sweep job.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use geostitch_service::dispatch::TriggerDispatcher;

use crate::executor::{JobExecutionError, JobHandler};

/// Re-examines pending upload sessions on a schedule, catching sessions
/// whose triggering event was missed or whose chunks landed after the
/// manifest event.
#[derive(Debug)]
pub struct SweepJobHandler {
    /// Trigger dispatcher handling the sweep.
    dispatcher: Arc<TriggerDispatcher>,
}

impl SweepJobHandler {
    /// Create a new sweep job handler
    pub fn new(dispatcher: Arc<TriggerDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl JobHandler for SweepJobHandler {
    fn job_type(&self) -> &str {
        "reassembly_sweep"
    }

    async fn execute(&self) -> Result<Option<Value>, JobExecutionError> {
        let response = self
            .dispatcher
            .dispatch(serde_json::json!({ "source": "scheduler" }))
            .await
            .map_err(|e| JobExecutionError::Transient(format!("Sweep failed: {e}")))?;

        tracing::info!(message = %response.message, "Sweep job finished");
        Ok(Some(serde_json::json!({
            "task": "reassembly_sweep",
            "message": response.message,
        })))
    }
}

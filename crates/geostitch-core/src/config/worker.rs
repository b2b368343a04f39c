//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Background worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression for the pending-session sweep.
    #[serde(default = "default_sweep_schedule")]
    pub sweep_schedule: String,
    /// Maximum number of pending sessions examined per sweep.
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: i64,
    /// Cron expression for the stale-multipart janitor.
    #[serde(default = "default_janitor_schedule")]
    pub janitor_schedule: String,
    /// Age in hours after which an in-progress multipart upload is aborted.
    #[serde(default = "default_janitor_max_age")]
    pub janitor_max_age_hours: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sweep_schedule: default_sweep_schedule(),
            sweep_batch_size: default_sweep_batch(),
            janitor_schedule: default_janitor_schedule(),
            janitor_max_age_hours: default_janitor_max_age(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sweep_schedule() -> String {
    // Every 5 minutes
    "0 */5 * * * *".to_string()
}

fn default_sweep_batch() -> i64 {
    25
}

fn default_janitor_schedule() -> String {
    // Every hour
    "0 0 * * * *".to_string()
}

fn default_janitor_max_age() -> i64 {
    24
}

//! Upload session status.

use serde::{Deserialize, Serialize};

/// Status of a chunked upload session.
///
/// Transitions are one-way: `Pending` → `Completed` or `Pending` → `Failed`.
/// A terminal session never goes back to pending; re-running reassembly for
/// the same file means creating a new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Chunks are still accumulating, or reassembly has not succeeded yet.
    Pending,
    /// Reassembly succeeded and the result record was linked.
    Completed,
    /// Reassembly failed permanently for this session.
    Failed,
}

impl SessionStatus {
    /// Return the status as a string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status string.
    pub fn from_str_or_pending(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

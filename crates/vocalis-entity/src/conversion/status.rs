//! Conversion job lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a conversion job.
///
/// ```text
/// PendingPreprocessing -> Queued -> Processing -> Completed
///          |                 |           |
///          +------> Failed <-+-----------+
/// ```
///
/// `Processing -> Queued` is the revert taken when a claimed job could not
/// be published or its claim went stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "conversion_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversionStatus {
    /// Waiting for the audio input's preprocessing to finish.
    PendingPreprocessing,
    /// Ready to be dispatched to a conversion queue.
    Queued,
    /// Dispatched; the conversion service owns the job.
    Processing,
    /// Output written.
    Completed,
    /// Gave up.
    Failed,
}

impl ConversionStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPreprocessing => "pending_preprocessing",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

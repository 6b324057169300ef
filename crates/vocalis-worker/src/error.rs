//! Per-row processing errors.

use vocalis_core::error::AppError;
use vocalis_gateway::QueueError;

/// Why one row did not advance.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// A dependency failed in a way that may clear up; the row is retried.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retrying cannot help; the row is failed.
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// A store call failed, including lost version races.
    #[error("Store error: {0}")]
    Store(#[from] AppError),
}

impl ProcessError {
    /// Whether another instance changed the row first.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_version_conflict())
    }
}

impl From<QueueError> for ProcessError {
    fn from(err: QueueError) -> Self {
        if err.is_permanent() {
            Self::Permanent(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

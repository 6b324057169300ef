//! Queue transport seam.

use async_trait::async_trait;
use thiserror::Error;

use vocalis_core::error::{AppError, ErrorKind};

/// Failures talking to the queue service.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The named queue does not exist. Retrying will not help.
    #[error("queue '{0}' does not exist")]
    QueueNotFound(String),
    /// Name resolution failed for another reason.
    #[error("failed to resolve queue '{name}': {message}")]
    Resolution {
        /// Logical queue name.
        name: String,
        /// Transport error text.
        message: String,
    },
    /// The message could not be sent.
    #[error("failed to publish to queue: {0}")]
    Publish(String),
    /// The message could not be encoded.
    #[error("failed to encode queue message: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether retrying the same operation can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::QueueNotFound(_) | Self::Serialization(_))
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        let kind = match &err {
            QueueError::QueueNotFound(_) => ErrorKind::Configuration,
            QueueError::Serialization(_) => ErrorKind::Serialization,
            QueueError::Resolution { .. } | QueueError::Publish(_) => ErrorKind::ExternalService,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}

/// A message queue service.
#[async_trait]
pub trait QueueTransport: Send + Sync + std::fmt::Debug + 'static {
    /// Look up the dispatch address of a logical queue name.
    async fn resolve(&self, name: &str) -> Result<String, QueueError>;

    /// Send `body` to `address`. Returns the transport's message id.
    async fn publish(&self, address: &str, body: &str) -> Result<String, QueueError>;
}

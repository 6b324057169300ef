//! Queue name resolution with a per-instance address cache.

use std::sync::Arc;

use moka::future::Cache;
use tracing::{debug, warn};

use super::message::ConversionMessage;
use super::transport::{QueueError, QueueTransport};

/// Publishes conversion messages to logical queues.
///
/// Resolved addresses are cached for the lifetime of the process; there is
/// no TTL. A failed publish evicts the address for that name so the next
/// attempt resolves it again.
#[derive(Debug, Clone)]
pub struct QueueGateway {
    transport: Arc<dyn QueueTransport>,
    addresses: Cache<String, String>,
}

impl QueueGateway {
    /// Create a gateway over `transport` with an empty address cache.
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self {
            transport,
            addresses: Cache::builder().name("queue-addresses").build(),
        }
    }

    /// Resolve `name`, consulting the cache first.
    pub async fn resolve_address(&self, name: &str) -> Result<String, QueueError> {
        if let Some(address) = self.addresses.get(name).await {
            return Ok(address);
        }

        let address = self.transport.resolve(name).await?;
        debug!(queue = name, address = %address, "Resolved queue address");
        self.addresses
            .insert(name.to_string(), address.clone())
            .await;
        Ok(address)
    }

    /// Encode and publish `message` to the queue called `name`.
    pub async fn publish(
        &self,
        name: &str,
        message: &ConversionMessage,
    ) -> Result<String, QueueError> {
        let body = serde_json::to_string(message)?;
        let address = self.resolve_address(name).await?;

        match self.transport.publish(&address, &body).await {
            Ok(message_id) => {
                debug!(
                    queue = name,
                    job_id = %message.job_id,
                    message_id = %message_id,
                    "Published conversion message"
                );
                Ok(message_id)
            }
            Err(e) => {
                warn!(queue = name, job_id = %message.job_id, error = %e, "Publish failed");
                self.invalidate(name).await;
                Err(e)
            }
        }
    }

    /// Forget the cached address for `name`.
    pub async fn invalidate(&self, name: &str) {
        self.addresses.invalidate(name).await;
    }

    /// Forget every cached address.
    pub fn invalidate_all(&self) {
        self.addresses.invalidate_all();
    }
}

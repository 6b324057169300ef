//! In-process queue transport for local runs and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::message::ConversionMessage;
use super::transport::{QueueError, QueueTransport};

const ADDRESS_PREFIX: &str = "memory://";

/// Records published messages per queue. Only queues registered up front
/// resolve; anything else is reported as not existing.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueTransport {
    queues: Arc<Mutex<HashMap<String, Vec<String>>>>,
    resolve_calls: Arc<AtomicUsize>,
    failing_publishes: Arc<AtomicUsize>,
}

impl MemoryQueueTransport {
    /// Create a transport with the given queue names.
    pub fn with_queues<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queues = names
            .into_iter()
            .map(|name| (name.into(), Vec::new()))
            .collect();
        Self {
            queues: Arc::new(Mutex::new(queues)),
            ..Self::default()
        }
    }

    /// Make the next `count` publishes fail with a transient error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    /// Number of `resolve` calls seen.
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    /// Raw bodies published to `name`.
    pub async fn bodies(&self, name: &str) -> Vec<String> {
        let queues = self.queues.lock().await;
        queues.get(name).cloned().unwrap_or_default()
    }

    /// Decoded messages published to `name`.
    pub async fn messages(&self, name: &str) -> Vec<ConversionMessage> {
        self.bodies(name)
            .await
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl QueueTransport for MemoryQueueTransport {
    async fn resolve(&self, name: &str) -> Result<String, QueueError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let queues = self.queues.lock().await;
        if queues.contains_key(name) {
            Ok(format!("{ADDRESS_PREFIX}{name}"))
        } else {
            Err(QueueError::QueueNotFound(name.to_string()))
        }
    }

    async fn publish(&self, address: &str, body: &str) -> Result<String, QueueError> {
        if self.take_failure() {
            return Err(QueueError::Publish("injected publish failure".to_string()));
        }

        let name = address.strip_prefix(ADDRESS_PREFIX).unwrap_or(address);
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))?;
        queue.push(body.to_string());
        Ok(Uuid::new_v4().to_string())
    }
}

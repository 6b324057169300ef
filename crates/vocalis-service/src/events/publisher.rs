//! Fan-out of domain events into delivery rows.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use vocalis_core::result::AppResult;
use vocalis_core::traits::Clock;
use vocalis_database::store::{WebhookDeliveryStore, WebhookSubscriptionStore};
use vocalis_entity::webhook::{WebhookDeliveryAttempt, WebhookEvent};

/// Accepts domain events for outbound notification.
#[async_trait]
pub trait EventPublisher: Send + Sync + std::fmt::Debug + 'static {
    /// Record `event` for delivery. Returns the number of deliveries created.
    async fn publish(&self, event: WebhookEvent) -> AppResult<usize>;
}

/// Writes one pending [`WebhookDeliveryAttempt`] per active subscription of
/// the event's owner that registered for its type. The delivery processor
/// picks them up from there.
#[derive(Clone)]
pub struct WebhookEventPublisher {
    subscriptions: Arc<dyn WebhookSubscriptionStore>,
    deliveries: Arc<dyn WebhookDeliveryStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WebhookEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookEventPublisher").finish_non_exhaustive()
    }
}

impl WebhookEventPublisher {
    /// Create a publisher over the given stores.
    pub fn new(
        subscriptions: Arc<dyn WebhookSubscriptionStore>,
        deliveries: Arc<dyn WebhookDeliveryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            clock,
        }
    }
}

#[async_trait]
impl EventPublisher for WebhookEventPublisher {
    async fn publish(&self, event: WebhookEvent) -> AppResult<usize> {
        let Some(user_id) = event.user_id() else {
            debug!(event_type = event.event_type(), "Event has no owner, not fanned out");
            return Ok(0);
        };

        let subscriptions = self
            .subscriptions
            .find_active_for_event(user_id, event.event_type())
            .await?;

        let now = self.clock.now();
        for subscription in &subscriptions {
            let attempt = WebhookDeliveryAttempt::for_event(subscription.id, &event, now);
            self.deliveries.insert(&attempt).await?;
            debug!(
                delivery_id = %attempt.id,
                subscription_id = %subscription.id,
                event_type = event.event_type(),
                "Queued webhook delivery"
            );
        }

        if !subscriptions.is_empty() {
            info!(
                event_type = event.event_type(),
                entity_id = %event.entity_id(),
                deliveries = subscriptions.len(),
                "Fanned out webhook event"
            );
        }
        Ok(subscriptions.len())
    }
}

//! Webhook subscription management.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use vocalis_core::error::AppError;
use vocalis_core::result::AppResult;
use vocalis_core::traits::Clock;
use vocalis_database::store::WebhookSubscriptionStore;
use vocalis_entity::webhook::WebhookSubscription;
use vocalis_entity::webhook::event::{SUBSCRIBABLE_EVENTS, WebhookEvent};
use vocalis_entity::webhook::subscription::CreateWebhookSubscription;
use vocalis_gateway::{
    DeliveryError, DeliveryOutcome, TargetValidator, WebhookRequest, WebhookSender,
};

/// Request to register a webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    /// Owning user.
    pub user_id: Uuid,
    /// HTTPS target.
    #[validate(url(message = "Invalid webhook URL"))]
    pub url: String,
    /// Signing secret; generated when absent.
    #[serde(default)]
    pub secret: Option<String>,
    /// Event types to receive.
    #[validate(length(min = 1, message = "At least one event type is required"))]
    pub event_types: Vec<String>,
}

/// Registers, re-enables and test-fires webhook subscriptions.
#[derive(Clone)]
pub struct SubscriptionService {
    subscriptions: Arc<dyn WebhookSubscriptionStore>,
    validator: TargetValidator,
    sender: Arc<dyn WebhookSender>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl SubscriptionService {
    /// Creates a new subscription service.
    pub fn new(
        subscriptions: Arc<dyn WebhookSubscriptionStore>,
        validator: TargetValidator,
        sender: Arc<dyn WebhookSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            validator,
            sender,
            clock,
        }
    }

    /// A fresh signing secret: `whsec_` followed by 32 random bytes in hex.
    pub fn generate_secret() -> String {
        format!("whsec_{}", hex::encode(rand::random::<[u8; 32]>()))
    }

    /// Validate and store a new subscription.
    pub async fn create(&self, request: CreateSubscriptionRequest) -> AppResult<WebhookSubscription> {
        request
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        if let Some(unknown) = request
            .event_types
            .iter()
            .find(|e| !SUBSCRIBABLE_EVENTS.contains(&e.as_str()))
        {
            return Err(AppError::validation(format!("Unknown event type '{unknown}'")));
        }

        let url = self
            .validator
            .validate(&request.url)
            .await
            .map_err(|e| AppError::validation(e.to_string()))?;

        let secret = request
            .secret
            .filter(|s| !s.is_empty())
            .unwrap_or_else(Self::generate_secret);

        let mut event_types = request.event_types;
        event_types.sort();
        event_types.dedup();

        let subscription = WebhookSubscription::new(
            CreateWebhookSubscription {
                user_id: request.user_id,
                url: url.to_string(),
                secret,
                event_types,
            },
            self.clock.now(),
        );
        let subscription = self.subscriptions.insert(&subscription).await?;

        info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            "Created webhook subscription"
        );
        Ok(subscription)
    }

    async fn owned(&self, id: Uuid, user_id: Uuid) -> AppResult<WebhookSubscription> {
        self.subscriptions
            .find_by_id(id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or_else(|| AppError::not_found(format!("Webhook subscription {id} not found")))
    }

    /// Turn a subscription back on and clear its failure streak.
    pub async fn reactivate(&self, id: Uuid, user_id: Uuid) -> AppResult<WebhookSubscription> {
        let mut subscription = self.owned(id, user_id).await?;
        let expected_version = subscription.version;
        subscription.reactivate(self.clock.now());
        let subscription = self
            .subscriptions
            .update(&subscription, expected_version)
            .await?;

        info!(subscription_id = %subscription.id, "Reactivated webhook subscription");
        Ok(subscription)
    }

    /// Fire a signed `webhook.test` event at the subscription's endpoint.
    ///
    /// Nothing is persisted and the failure counters are left alone. The
    /// send runs in the background; the returned handle resolves to its
    /// result.
    pub async fn send_test(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> AppResult<JoinHandle<Result<DeliveryOutcome, DeliveryError>>> {
        let subscription = self.owned(id, user_id).await?;

        let delivery_id = Uuid::now_v7();
        let now = self.clock.now();
        let event = WebhookEvent::Test {
            subscription_id: subscription.id,
        };
        let request = WebhookRequest::signed(
            delivery_id,
            subscription.url,
            event.event_type(),
            &subscription.secret,
            &event.payload(delivery_id, now),
            now,
        )?;

        let sender = Arc::clone(&self.sender);
        let subscription_id = subscription.id;
        Ok(tokio::spawn(async move {
            let result = sender.send(&request).await;
            match &result {
                Ok(outcome) => info!(
                    %subscription_id,
                    status = outcome.status_code,
                    "Test webhook delivered"
                ),
                Err(e) => warn!(%subscription_id, error = %e, "Test webhook failed"),
            }
            result
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use vocalis_core::error::ErrorKind;
    use vocalis_core::traits::ManualClock;
    use vocalis_database::MemoryStore;
    use vocalis_gateway::WebhookSigner;

    #[derive(Debug, Default)]
    struct RecordingSender {
        requests: Mutex<Vec<WebhookRequest>>,
    }

    #[async_trait]
    impl WebhookSender for RecordingSender {
        async fn send(&self, request: &WebhookRequest) -> Result<DeliveryOutcome, DeliveryError> {
            self.requests.lock().await.push(request.clone());
            Ok(DeliveryOutcome { status_code: 204 })
        }
    }

    fn service(store: &MemoryStore, sender: Arc<RecordingSender>) -> SubscriptionService {
        SubscriptionService::new(
            Arc::new(store.clone()),
            TargetValidator::new(),
            sender,
            Arc::new(ManualClock::default()),
        )
    }

    fn request(url: &str, events: &[&str]) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            user_id: Uuid::new_v4(),
            url: url.to_string(),
            secret: None,
            event_types: events.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_generates_secret() {
        let store = MemoryStore::new();
        let svc = service(&store, Arc::default());
        let sub = svc
            .create(request("https://93.184.216.34/hook", &["conversion.completed"]))
            .await
            .unwrap();

        assert!(sub.is_active);
        assert!(sub.secret.starts_with("whsec_"));
        assert_eq!(sub.secret.len(), "whsec_".len() + 64);
        assert_ne!(sub.secret, SubscriptionService::generate_secret());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_targets() {
        let store = MemoryStore::new();
        let svc = service(&store, Arc::default());

        for url in [
            "http://93.184.216.34/hook",
            "https://127.0.0.1/hook",
            "https://10.0.0.8/hook",
            "https://localhost/hook",
            "not a url",
        ] {
            let err = svc
                .create(request(url, &["conversion.completed"]))
                .await
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{url}");
        }

        let err = svc
            .create(request("https://93.184.216.34/hook", &["user.deleted"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = svc
            .create(request("https://93.184.216.34/hook", &[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_reactivate_resets_streak() {
        let store = MemoryStore::new();
        let svc = service(&store, Arc::default());
        let created = svc
            .create(request("https://93.184.216.34/hook", &["conversion.failed"]))
            .await
            .unwrap();

        let mut disabled = created.clone();
        for _ in 0..10 {
            disabled.record_failure(10, chrono::Utc::now());
        }
        let disabled = WebhookSubscriptionStore::update(&store, &disabled, created.version).await.unwrap();
        assert!(!disabled.is_active);

        let err = svc.reactivate(created.id, Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());

        let active = svc.reactivate(created.id, created.user_id).await.unwrap();
        assert!(active.is_active);
        assert_eq!(active.consecutive_failures, 0);
        assert!(active.disabled_at.is_none());
        assert_eq!(active.version, disabled.version + 1);
    }

    #[tokio::test]
    async fn test_send_test_signs_and_persists_nothing() {
        let store = MemoryStore::new();
        let sender = Arc::new(RecordingSender::default());
        let svc = service(&store, Arc::clone(&sender));
        let sub = svc
            .create(request("https://93.184.216.34/hook", &["conversion.completed"]))
            .await
            .unwrap();

        let outcome = svc
            .send_test(sub.id, sub.user_id)
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status_code, 204);

        let requests = sender.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].event_type, "webhook.test");
        assert!(WebhookSigner::verify(&sub.secret, &requests[0].body, &requests[0].signature));
        drop(requests);

        assert!(store.deliveries().await.is_empty());
        let stored = WebhookSubscriptionStore::find_by_id(&store, sub.id).await.unwrap().unwrap();
        assert_eq!(stored.version, sub.version);
        assert_eq!(stored.consecutive_failures, 0);
    }
}

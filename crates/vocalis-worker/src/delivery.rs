//! Webhook delivery processor.
//!
//! Each delivery goes through up to three compare-and-swap writes: the
//! claim before the HTTP call, then the delivered or failed result after
//! it. Losing any of them means another instance owns the row, and this
//! instance leaves both the row and the subscription counters alone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vocalis_core::config::DeliveryConfig;
use vocalis_core::error::AppError;
use vocalis_core::result::AppResult;
use vocalis_core::traits::Clock;
use vocalis_database::store::{WebhookDeliveryStore, WebhookSubscriptionStore};
use vocalis_entity::webhook::WebhookSubscription;
use vocalis_gateway::{WebhookRequest, WebhookSender};

use crate::backoff::BackoffPolicy;
use crate::error::ProcessError;
use crate::runner::{CycleReport, PollingLoop, PollingProcessor, RowOutcome, RowResult};

/// Re-reads allowed when a subscription counter write loses a race.
const COUNTER_WRITE_ATTEMPTS: usize = 3;

/// Drives webhook deliveries to `Delivered` or `Failed`.
#[derive(Clone)]
pub struct DeliveryProcessor {
    deliveries: Arc<dyn WebhookDeliveryStore>,
    subscriptions: Arc<dyn WebhookSubscriptionStore>,
    sender: Arc<dyn WebhookSender>,
    backoff: BackoffPolicy,
    config: DeliveryConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DeliveryProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryProcessor")
            .field("sender", &self.sender)
            .field("backoff", &self.backoff)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DeliveryProcessor {
    /// Create a new delivery processor.
    pub fn new(
        deliveries: Arc<dyn WebhookDeliveryStore>,
        subscriptions: Arc<dyn WebhookSubscriptionStore>,
        sender: Arc<dyn WebhookSender>,
        config: DeliveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            deliveries,
            subscriptions,
            sender,
            backoff: BackoffPolicy::new(config.max_attempts),
            config,
            clock,
        }
    }

    /// Poll until cancelled.
    pub async fn run(self: Arc<Self>, cancel: watch::Receiver<bool>) {
        PollingLoop::new(self).run(cancel).await;
    }

    /// Attempt one delivery.
    pub async fn process(&self, id: Uuid) -> RowResult {
        let Some(mut attempt) = self.deliveries.find_by_id(id).await? else {
            return Ok(RowOutcome::Skipped);
        };
        let now = self.clock.now();
        if !attempt.is_claimable(now, self.config.stuck_threshold()) {
            return Ok(RowOutcome::Skipped);
        }

        let subscription = self
            .subscriptions
            .find_by_id(attempt.subscription_id)
            .await?
            .filter(|s| s.is_active);
        let Some(subscription) = subscription else {
            let expected_version = attempt.version;
            attempt.abandon("Subscription disabled", now);
            let attempt = self.deliveries.update(&attempt, expected_version).await?;
            info!(
                delivery_id = %attempt.id,
                subscription_id = %attempt.subscription_id,
                status = %attempt.status,
                attempt_count = attempt.attempt_count,
                "Delivery closed, subscription inactive"
            );
            return Ok(RowOutcome::Failed);
        };

        let request = WebhookRequest::signed(
            attempt.id,
            subscription.url.as_str(),
            attempt.event_type.as_str(),
            &subscription.secret,
            &attempt.payload,
            now,
        )
        .map_err(AppError::from)?;

        let expected_version = attempt.version;
        attempt.mark_processing(now);
        let mut attempt = self.deliveries.update(&attempt, expected_version).await?;
        debug!(
            delivery_id = %attempt.id,
            status = %attempt.status,
            attempt_count = attempt.attempt_count,
            "Claimed delivery"
        );

        match self.sender.send(&request).await {
            Ok(outcome) => {
                let expected_version = attempt.version;
                attempt.mark_delivered(outcome.status_code, self.clock.now());
                let attempt = self.deliveries.update(&attempt, expected_version).await?;
                info!(
                    delivery_id = %attempt.id,
                    status = %attempt.status,
                    attempt_count = attempt.attempt_count,
                    status_code = outcome.status_code,
                    "Webhook delivered"
                );
                self.update_subscription(subscription.id, |s, now| {
                    s.record_success(now);
                    false
                })
                .await;
                Ok(RowOutcome::Advanced)
            }
            Err(e) => {
                let now = self.clock.now();
                let attempts = attempt.attempt_count + 1;
                let next_retry_at = (!self.backoff.is_exhausted(attempts))
                    .then(|| now + self.backoff.delay_for(attempts));

                let expected_version = attempt.version;
                attempt.record_failure(e.to_string(), e.status_code(), next_retry_at, now);
                let attempt = self.deliveries.update(&attempt, expected_version).await?;

                let threshold = self.config.auto_disable_threshold;
                let disabled = self
                    .update_subscription(subscription.id, |s, now| s.record_failure(threshold, now))
                    .await;
                if disabled {
                    warn!(
                        subscription_id = %subscription.id,
                        threshold,
                        "Webhook subscription disabled after consecutive failures"
                    );
                }

                match attempt.next_retry_at {
                    Some(next) => {
                        warn!(
                            delivery_id = %attempt.id,
                            status = %attempt.status,
                            attempt_count = attempt.attempt_count,
                            next_retry_at = %next,
                            error = %e,
                            "Webhook delivery failed, will retry"
                        );
                        Ok(RowOutcome::Retried)
                    }
                    None => {
                        error!(
                            delivery_id = %attempt.id,
                            status = %attempt.status,
                            attempt_count = attempt.attempt_count,
                            error = %e,
                            "Webhook delivery failed permanently"
                        );
                        Ok(RowOutcome::Failed)
                    }
                }
            }
        }
    }

    /// Apply `change` to the subscription's counters, re-reading on lost
    /// races. Returns what `change` returned on the write that stuck.
    async fn update_subscription<F>(&self, id: Uuid, change: F) -> bool
    where
        F: Fn(&mut WebhookSubscription, chrono::DateTime<chrono::Utc>) -> bool,
    {
        for _ in 0..COUNTER_WRITE_ATTEMPTS {
            match self.try_update_subscription(id, &change).await {
                Ok(result) => return result,
                Err(e) if e.is_version_conflict() => continue,
                Err(e) => {
                    error!(subscription_id = %id, error = %e, "Failed to update subscription counters");
                    return false;
                }
            }
        }
        warn!(subscription_id = %id, "Gave up updating subscription counters after repeated conflicts");
        false
    }

    async fn try_update_subscription<F>(&self, id: Uuid, change: &F) -> AppResult<bool>
    where
        F: Fn(&mut WebhookSubscription, chrono::DateTime<chrono::Utc>) -> bool,
    {
        let Some(mut subscription) = self.subscriptions.find_by_id(id).await? else {
            return Ok(false);
        };
        let expected_version = subscription.version;
        let result = change(&mut subscription, self.clock.now());
        self.subscriptions
            .update(&subscription, expected_version)
            .await?;
        Ok(result)
    }

    fn log_row_error(id: Uuid, e: &ProcessError) {
        if e.is_version_conflict() {
            debug!(delivery_id = %id, "Delivery changed by another instance, skipped");
        } else {
            error!(delivery_id = %id, error = %e, "Failed to process webhook delivery");
        }
    }
}

#[async_trait]
impl PollingProcessor for DeliveryProcessor {
    fn name(&self) -> &'static str {
        "delivery"
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn poll_once(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let now = self.clock.now();
        let stuck_before = now - self.config.stuck_threshold();

        match self
            .deliveries
            .find_claimable(now, stuck_before, self.config.batch_size)
            .await
        {
            Ok(ids) => {
                for id in ids {
                    let result = self.process(id).await;
                    if let Err(e) = &result {
                        Self::log_row_error(id, e);
                    }
                    report.record(&result);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to query claimable deliveries");
                report.errors += 1;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;
    use vocalis_core::traits::ManualClock;
    use vocalis_database::MemoryStore;
    use vocalis_entity::webhook::subscription::CreateWebhookSubscription;
    use vocalis_entity::webhook::{DeliveryStatus, WebhookDeliveryAttempt, WebhookEvent};
    use vocalis_gateway::{DeliveryError, DeliveryOutcome, WebhookSigner};

    #[derive(Debug, Default)]
    struct ScriptedSender {
        fail: Mutex<bool>,
        requests: Mutex<Vec<WebhookRequest>>,
    }

    #[async_trait]
    impl WebhookSender for ScriptedSender {
        async fn send(&self, request: &WebhookRequest) -> Result<DeliveryOutcome, DeliveryError> {
            self.requests.lock().await.push(request.clone());
            if *self.fail.lock().await {
                Err(DeliveryError::Status(503))
            } else {
                Ok(DeliveryOutcome { status_code: 200 })
            }
        }
    }

    struct Fixture {
        store: MemoryStore,
        sender: Arc<ScriptedSender>,
        clock: Arc<ManualClock>,
        processor: DeliveryProcessor,
        subscription: WebhookSubscription,
    }

    async fn fixture(failing: bool) -> Fixture {
        let store = MemoryStore::new();
        let sender = Arc::new(ScriptedSender::default());
        *sender.fail.lock().await = failing;
        let clock = Arc::new(ManualClock::default());
        let subscription = WebhookSubscription::new(
            CreateWebhookSubscription {
                user_id: Uuid::new_v4(),
                url: "https://93.184.216.34/hook".to_string(),
                secret: "whsec_test".to_string(),
                event_types: vec!["conversion.completed".to_string()],
            },
            clock.now(),
        );
        let subscription = WebhookSubscriptionStore::insert(&store, &subscription)
            .await
            .unwrap();
        let processor = DeliveryProcessor::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            sender.clone(),
            DeliveryConfig::default(),
            clock.clone(),
        );
        Fixture {
            store,
            sender,
            clock,
            processor,
            subscription,
        }
    }

    async fn enqueue(f: &Fixture) -> WebhookDeliveryAttempt {
        let event = WebhookEvent::ConversionCompleted {
            job_id: Uuid::new_v4(),
            user_id: f.subscription.user_id,
            audio_input_id: Uuid::new_v4(),
            voice_model_id: Uuid::new_v4(),
            output_key: "conversions/u/j.wav".to_string(),
            completed_at: f.clock.now(),
        };
        let attempt = WebhookDeliveryAttempt::for_event(f.subscription.id, &event, f.clock.now());
        WebhookDeliveryStore::insert(&f.store, &attempt).await.unwrap()
    }

    async fn reload(f: &Fixture, id: Uuid) -> WebhookDeliveryAttempt {
        WebhookDeliveryStore::find_by_id(&f.store, id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_success_marks_delivered_and_resets_streak() {
        let f = fixture(false).await;
        let mut sub = f.subscription.clone();
        sub.consecutive_failures = 3;
        WebhookSubscriptionStore::update(&f.store, &sub, sub.version).await.unwrap();
        let attempt = enqueue(&f).await;

        assert_eq!(f.processor.process(attempt.id).await.unwrap(), RowOutcome::Advanced);

        let attempt = reload(&f, attempt.id).await;
        assert_eq!(attempt.status, DeliveryStatus::Delivered);
        assert_eq!(attempt.attempt_count, 1);
        assert_eq!(attempt.last_status_code, Some(200));
        assert_eq!(attempt.version, 2);

        let sub = WebhookSubscriptionStore::find_by_id(&f.store, f.subscription.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.consecutive_failures, 0);

        let requests = f.sender.requests.lock().await;
        assert!(WebhookSigner::verify("whsec_test", &requests[0].body, &requests[0].signature));
    }

    #[tokio::test]
    async fn test_failure_schedules_backoff() {
        let f = fixture(true).await;
        let attempt = enqueue(&f).await;
        let start = f.clock.now();

        assert_eq!(f.processor.process(attempt.id).await.unwrap(), RowOutcome::Retried);
        let attempt = reload(&f, attempt.id).await;
        assert_eq!(attempt.status, DeliveryStatus::Pending);
        assert_eq!(attempt.attempt_count, 1);
        assert_eq!(attempt.last_status_code, Some(503));
        assert_eq!(attempt.next_retry_at, Some(start + chrono::Duration::seconds(2)));

        assert_eq!(f.processor.process(attempt.id).await.unwrap(), RowOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_inactive_subscription_is_never_called() {
        let f = fixture(false).await;
        let mut sub = f.subscription.clone();
        sub.is_active = false;
        WebhookSubscriptionStore::update(&f.store, &sub, sub.version).await.unwrap();
        let attempt = enqueue(&f).await;

        assert_eq!(f.processor.process(attempt.id).await.unwrap(), RowOutcome::Failed);
        let attempt = reload(&f, attempt.id).await;
        assert_eq!(attempt.status, DeliveryStatus::Failed);
        assert_eq!(attempt.attempt_count, 0);
        assert!(f.sender.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lost_claim_sends_nothing() {
        let f = fixture(false).await;
        let attempt = enqueue(&f).await;

        let mut other = attempt.clone();
        other.mark_processing(f.clock.now());
        WebhookDeliveryStore::update(&f.store, &other, attempt.version).await.unwrap();

        assert_eq!(f.processor.process(attempt.id).await.unwrap(), RowOutcome::Skipped);
        assert!(f.sender.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_poll_once_processes_batch() {
        let f = fixture(false).await;
        for _ in 0..3 {
            enqueue(&f).await;
        }
        let report = f.processor.poll_once().await;
        assert_eq!(report.examined, 3);
        assert_eq!(report.advanced, 3);
        assert_eq!(f.sender.requests.lock().await.len(), 3);
    }
}

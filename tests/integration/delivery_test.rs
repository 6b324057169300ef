//! Webhook delivery retries, stuck claims and subscription auto-disable.

use chrono::Duration;
use uuid::Uuid;

use vocalis_core::traits::Clock;
use vocalis_database::store::WebhookDeliveryStore;
use vocalis_entity::webhook::DeliveryStatus;
use vocalis_worker::PollingProcessor;

use crate::helpers::{Pipeline, RecordingSender};

#[tokio::test]
async fn test_failed_delivery_backs_off_then_gives_up() {
    let p = Pipeline::with_sender(RecordingSender::failing());
    let subscription = p.subscribe(Uuid::new_v4()).await;
    let delivery = p.enqueue_delivery(&subscription).await;
    let processor = p.delivery_processor();

    for _ in 0..60 {
        processor.poll_once().await;
        p.clock.advance(Duration::seconds(1));
    }

    let sent_at: Vec<_> = p
        .sender
        .requests()
        .await
        .iter()
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(sent_at.len(), 5);
    let gaps: Vec<i64> = sent_at
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .collect();
    assert_eq!(gaps, vec![2, 4, 8, 16]);

    let stored = p.delivery(delivery.id).await;
    assert_eq!(stored.status, DeliveryStatus::Failed);
    assert_eq!(stored.attempt_count, 5);
    assert_eq!(stored.last_status_code, Some(500));
    assert!(stored.next_retry_at.is_none());

    p.clock.advance(Duration::hours(1));
    processor.poll_once().await;
    assert_eq!(p.sender.send_count().await, 5);
}

#[tokio::test]
async fn test_stuck_claim_is_reclaimed_after_threshold() {
    let p = Pipeline::new();
    let subscription = p.subscribe(Uuid::new_v4()).await;
    let stuck = p.enqueue_delivery(&subscription).await;
    let recent = p.enqueue_delivery(&subscription).await;
    let now = p.clock.now();

    for (attempt, claimed_ago) in [(&stuck, 6), (&recent, 4)] {
        let mut claimed = attempt.clone();
        claimed.mark_processing(now - Duration::minutes(claimed_ago));
        WebhookDeliveryStore::update(&p.store, &claimed, attempt.version)
            .await
            .unwrap();
    }

    let report = p.delivery_processor().poll_once().await;
    assert_eq!(report.advanced, 1);
    assert_eq!(p.sender.send_count().await, 1);
    assert_eq!(p.delivery(stuck.id).await.status, DeliveryStatus::Delivered);
    assert_eq!(p.delivery(recent.id).await.status, DeliveryStatus::Processing);
}

#[tokio::test]
async fn test_subscription_disabled_once_at_threshold() {
    let mut p = Pipeline::with_sender(RecordingSender::failing());
    p.delivery_config.max_attempts = 1;
    let subscription = p.subscribe(Uuid::new_v4()).await;
    let mut deliveries = Vec::new();
    for _ in 0..12 {
        deliveries.push(p.enqueue_delivery(&subscription).await);
    }
    let processor = p.delivery_processor();

    processor.poll_once().await;

    assert_eq!(p.sender.send_count().await, 10);
    let disabled = p.subscription(subscription.id).await;
    assert!(!disabled.is_active);
    assert_eq!(disabled.consecutive_failures, 10);
    let disabled_at = disabled.disabled_at.expect("disabled_at set");

    let abandoned: Vec<_> = p
        .store
        .deliveries()
        .await
        .into_iter()
        .filter(|d| d.last_error.as_deref() == Some("Subscription disabled"))
        .collect();
    assert_eq!(abandoned.len(), 2);
    assert!(abandoned.iter().all(|d| d.status == DeliveryStatus::Failed));
    assert!(abandoned.iter().all(|d| d.attempt_count == 0));

    // New deliveries for the disabled subscription never reach the endpoint.
    p.clock.advance(Duration::minutes(1));
    let late = p.enqueue_delivery(&subscription).await;
    processor.poll_once().await;

    assert_eq!(p.sender.send_count().await, 10);
    assert_eq!(p.delivery(late.id).await.status, DeliveryStatus::Failed);
    let still_disabled = p.subscription(subscription.id).await;
    assert_eq!(still_disabled.disabled_at, Some(disabled_at));
    assert_eq!(still_disabled.consecutive_failures, 10);
}

#[tokio::test]
async fn test_success_resets_failure_streak() {
    let p = Pipeline::with_sender(RecordingSender::failing());
    let subscription = p.subscribe(Uuid::new_v4()).await;
    p.enqueue_delivery(&subscription).await;
    p.enqueue_delivery(&subscription).await;
    let processor = p.delivery_processor();

    processor.poll_once().await;
    assert_eq!(p.subscription(subscription.id).await.consecutive_failures, 2);

    p.sender.set_failing(false);
    p.clock.advance(Duration::seconds(2));
    processor.poll_once().await;

    let stored = p.subscription(subscription.id).await;
    assert!(stored.is_active);
    assert_eq!(stored.consecutive_failures, 0);
    assert_eq!(p.sender.send_count().await, 4);
}

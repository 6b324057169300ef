//! Webhook delivery attempt entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::event::WebhookEvent;

/// Delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "delivery_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Waiting for its next attempt.
    Pending,
    /// Claimed by a processor instance; an HTTP call may be in flight.
    Processing,
    /// The endpoint answered 2xx.
    Delivered,
    /// Attempts exhausted or subscription disabled.
    Failed,
}

impl DeliveryStatus {
    /// Check if the delivery is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One event owed to one subscription, with its retry state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDeliveryAttempt {
    /// Unique identifier, also sent as `X-Webhook-Id`.
    pub id: Uuid,
    /// Target subscription.
    pub subscription_id: Uuid,
    /// Event type, sent as `X-Webhook-Event`.
    pub event_type: String,
    /// Kind of entity the event is about.
    pub entity_type: String,
    /// Identifier of that entity.
    pub entity_id: Uuid,
    /// Body sent verbatim on every attempt.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: DeliveryStatus,
    /// Attempts made so far.
    pub attempt_count: i32,
    /// Earliest time of the next attempt.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// When the current or last claim was taken.
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// When the endpoint accepted the event.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Last transport or status error.
    pub last_error: Option<String>,
    /// Last HTTP status received.
    pub last_status_code: Option<i32>,
    /// Optimistic-concurrency token.
    pub version: i64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl WebhookDeliveryAttempt {
    /// A new pending delivery of `event` to `subscription_id`, due now.
    pub fn for_event(subscription_id: Uuid, event: &WebhookEvent, now: DateTime<Utc>) -> Self {
        let id = Uuid::now_v7();
        Self {
            id,
            subscription_id,
            event_type: event.event_type().to_string(),
            entity_type: event.entity_type().to_string(),
            entity_id: event.entity_id(),
            payload: event.payload(id, now),
            status: DeliveryStatus::Pending,
            attempt_count: 0,
            next_retry_at: Some(now),
            last_attempted_at: None,
            delivered_at: None,
            last_error: None,
            last_status_code: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a processor may claim this row at `now`: pending and due, or
    /// stuck in `processing` for longer than `stuck_threshold`.
    pub fn is_claimable(&self, now: DateTime<Utc>, stuck_threshold: chrono::Duration) -> bool {
        match self.status {
            DeliveryStatus::Pending => self.next_retry_at.is_none_or(|at| at <= now),
            DeliveryStatus::Processing => self
                .last_attempted_at
                .is_none_or(|at| at < now - stuck_threshold),
            DeliveryStatus::Delivered | DeliveryStatus::Failed => false,
        }
    }

    /// Take the claim.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Processing;
        self.last_attempted_at = Some(now);
        self.updated_at = now;
    }

    /// Record acceptance by the endpoint.
    pub fn mark_delivered(&mut self, status_code: u16, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Delivered;
        self.attempt_count += 1;
        self.delivered_at = Some(now);
        self.last_status_code = Some(i32::from(status_code));
        self.last_error = None;
        self.next_retry_at = None;
        self.updated_at = now;
    }

    /// Record a failed attempt and schedule the next one, or give up when
    /// `next_retry_at` is `None`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        status_code: Option<u16>,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        self.attempt_count += 1;
        self.last_error = Some(error.into());
        self.last_status_code = status_code.map(i32::from);
        self.next_retry_at = next_retry_at;
        self.status = if next_retry_at.is_some() {
            DeliveryStatus::Pending
        } else {
            DeliveryStatus::Failed
        };
        self.updated_at = now;
    }

    /// Close the delivery without attempting it.
    pub fn abandon(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Failed;
        self.last_error = Some(reason.into());
        self.next_retry_at = None;
        self.updated_at = now;
    }
}

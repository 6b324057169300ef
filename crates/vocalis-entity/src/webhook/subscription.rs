//! Webhook subscription entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered HTTPS endpoint receiving signed event notifications.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookSubscription {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Target URL. Validated as public HTTPS at creation.
    pub url: String,
    /// HMAC-SHA256 signing secret.
    #[serde(skip_serializing)]
    pub secret: String,
    /// Event types this subscription receives (e.g. `conversion.completed`).
    pub event_types: Vec<String>,
    /// Inactive subscriptions receive no deliveries.
    pub is_active: bool,
    /// Failed deliveries since the last success.
    pub consecutive_failures: i32,
    /// Optimistic-concurrency token.
    pub version: i64,
    /// When the subscription was disabled, automatically or otherwise.
    pub disabled_at: Option<DateTime<Utc>>,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

/// Fields required to register a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWebhookSubscription {
    /// Owning user.
    pub user_id: Uuid,
    /// Target URL.
    pub url: String,
    /// Signing secret.
    pub secret: String,
    /// Subscribed event types.
    pub event_types: Vec<String>,
}

impl WebhookSubscription {
    /// Build a fresh active row.
    pub fn new(data: CreateWebhookSubscription, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: data.user_id,
            url: data.url,
            secret: data.secret,
            event_types: data.event_types,
            is_active: true,
            consecutive_failures: 0,
            version: 0,
            disabled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether deliveries of `event_type` go to this subscription.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.is_active && self.event_types.iter().any(|e| e == event_type)
    }

    /// Reset the failure streak after a successful delivery.
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.updated_at = now;
    }

    /// Count a failed delivery. Returns `true` if this call disabled the
    /// subscription.
    pub fn record_failure(&mut self, disable_threshold: i32, now: DateTime<Utc>) -> bool {
        self.consecutive_failures += 1;
        self.updated_at = now;
        if self.is_active && self.consecutive_failures >= disable_threshold {
            self.is_active = false;
            self.disabled_at = Some(now);
            return true;
        }
        false
    }

    /// Turn a disabled subscription back on with a clean failure streak.
    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = true;
        self.consecutive_failures = 0;
        self.disabled_at = None;
        self.updated_at = now;
    }
}

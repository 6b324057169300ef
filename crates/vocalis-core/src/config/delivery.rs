//! Webhook delivery processor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for outbound webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Whether the delivery processor runs in this instance.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between polling cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Maximum deliveries examined per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Attempts before a delivery is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    /// Age in seconds after which a `processing` delivery is reclaimed.
    #[serde(default = "default_stuck_threshold")]
    pub stuck_threshold_seconds: u64,
    /// Outbound request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Consecutive failures after which a subscription is disabled.
    #[serde(default = "default_auto_disable_threshold")]
    pub auto_disable_threshold: i32,
    /// `User-Agent` header for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl DeliveryConfig {
    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Outbound request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Stuck-claim threshold as a [`chrono::Duration`].
    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_threshold_seconds as i64)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            poll_interval_seconds: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            stuck_threshold_seconds: default_stuck_threshold(),
            request_timeout_seconds: default_request_timeout(),
            auto_disable_threshold: default_auto_disable_threshold(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    20
}

fn default_max_attempts() -> i32 {
    5
}

fn default_stuck_threshold() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_auto_disable_threshold() -> i32 {
    10
}

fn default_user_agent() -> String {
    format!("Vocalis-Webhooks/{}", env!("CARGO_PKG_VERSION"))
}

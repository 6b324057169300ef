//! Conversion processor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the background processor that advances conversion jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Whether the conversion processor runs in this instance.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between polling cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Maximum rows examined per phase per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Unsuccessful attempts allowed before a job is failed.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: i32,
    /// Minimum spacing in seconds between two attempts on the same job.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    /// Seconds a job may stay `Processing` before its claim is treated as
    /// abandoned and the job is put back in the queue.
    #[serde(default = "default_dispatch_stuck_threshold")]
    pub dispatch_stuck_threshold_seconds: u64,
    /// Prefix under which conversion outputs are written.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Completion callback URL handed to the conversion service, if any.
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Protocol tag sent alongside the callback URL.
    #[serde(default = "default_callback_protocol")]
    pub callback_protocol: String,
}

impl ConversionConfig {
    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Retry spacing as a [`chrono::Duration`].
    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retry_delay_seconds as i64)
    }

    /// Age after which a `Processing` claim is recovered.
    pub fn dispatch_stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dispatch_stuck_threshold_seconds as i64)
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            poll_interval_seconds: default_poll_interval(),
            batch_size: default_batch_size(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_seconds: default_retry_delay(),
            dispatch_stuck_threshold_seconds: default_dispatch_stuck_threshold(),
            output_prefix: default_output_prefix(),
            callback_url: None,
            callback_protocol: default_callback_protocol(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    3
}

fn default_batch_size() -> u32 {
    10
}

fn default_max_retry_attempts() -> i32 {
    5
}

fn default_retry_delay() -> u64 {
    300
}

fn default_dispatch_stuck_threshold() -> u64 {
    1800
}

fn default_output_prefix() -> String {
    "conversions".to_string()
}

fn default_callback_protocol() -> String {
    "https".to_string()
}

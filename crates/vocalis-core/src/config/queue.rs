//! Queue gateway configuration.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Environments allowed to run on the in-process queue transport.
const MEMORY_PROVIDER_ENVS: [&str; 2] = ["development", "test"];

/// Queue provider and logical queue names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Transport: `"memory"` or `"sqs"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Queue for untransposed, full-length conversions.
    #[serde(default = "default_main_queue")]
    pub main_queue: String,
    /// Queue for any transposed conversion.
    #[serde(default = "default_alt_queue")]
    pub alt_queue: String,
    /// Queue for untransposed preview conversions.
    #[serde(default = "default_preview_queue")]
    pub preview_queue: String,
    /// AWS region for the SQS transport.
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint (LocalStack, ElasticMQ).
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl QueueConfig {
    /// Reject settings that cannot work in `env`.
    ///
    /// The memory transport loses every message on restart and is never
    /// shared between instances, so only local environments may use it.
    pub fn validate_for(&self, env: &str) -> Result<(), AppError> {
        if self.provider == "memory" && !MEMORY_PROVIDER_ENVS.contains(&env) {
            return Err(AppError::configuration(format!(
                "Queue provider 'memory' is not allowed in the '{env}' environment"
            )));
        }
        Ok(())
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            main_queue: default_main_queue(),
            alt_queue: default_alt_queue(),
            preview_queue: default_preview_queue(),
            region: None,
            endpoint: None,
        }
    }
}

fn default_provider() -> String {
    "sqs".to_string()
}

fn default_main_queue() -> String {
    "voice-conversion".to_string()
}

fn default_alt_queue() -> String {
    "voice-conversion-alt".to_string()
}

fn default_preview_queue() -> String {
    "voice-conversion-preview".to_string()
}

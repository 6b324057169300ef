//! Completion callback configuration.

use serde::{Deserialize, Serialize};

/// Shared-secret authentication for the conversion completion callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Secret the conversion service presents on every callback.
    #[serde(default)]
    pub shared_secret: String,
    /// Header carrying the secret.
    #[serde(default = "default_header_name")]
    pub header_name: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            shared_secret: String::new(),
            header_name: default_header_name(),
        }
    }
}

fn default_header_name() -> String {
    "X-Callback-Secret".to_string()
}

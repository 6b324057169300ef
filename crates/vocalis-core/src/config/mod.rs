//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod app;
pub mod callback;
pub mod conversion;
pub mod database;
pub mod delivery;
pub mod logging;
pub mod queue;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::callback::CallbackConfig;
pub use self::conversion::ConversionConfig;
pub use self::database::DatabaseConfig;
pub use self::delivery::DeliveryConfig;
pub use self::logging::LoggingConfig;
pub use self::queue::QueueConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Conversion processor settings.
    #[serde(default)]
    pub conversion: ConversionConfig,
    /// Webhook delivery processor settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Queue gateway settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Completion callback settings.
    #[serde(default)]
    pub callback: CallbackConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `VOCALIS__`. Settings that
    /// are unsafe for `env` are rejected.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("VOCALIS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        config.queue.validate_for(env)?;
        Ok(config)
    }
}

//! PostgreSQL implementations of the store traits, one per table.

pub mod audio_input;
pub mod conversion_job;
pub mod webhook_delivery;
pub mod webhook_subscription;

pub use audio_input::AudioInputRepository;
pub use conversion_job::ConversionJobRepository;
pub use webhook_delivery::WebhookDeliveryRepository;
pub use webhook_subscription::WebhookSubscriptionRepository;

//! Domain event publication.

pub mod publisher;

pub use publisher::{EventPublisher, WebhookEventPublisher};

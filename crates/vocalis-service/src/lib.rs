//! # vocalis-service
//!
//! Services sitting between the HTTP boundary and the job store:
//! conversion job creation, the completion callback, webhook event fan-out
//! and subscription management.

pub mod conversion;
pub mod events;
pub mod webhook;

pub use conversion::{CallbackService, ConversionService};
pub use events::{EventPublisher, WebhookEventPublisher};
pub use webhook::SubscriptionService;

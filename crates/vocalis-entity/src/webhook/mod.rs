//! Webhook subscriptions, delivery attempts and event payloads.

pub mod delivery;
pub mod event;
pub mod subscription;

pub use delivery::{DeliveryStatus, WebhookDeliveryAttempt};
pub use event::WebhookEvent;
pub use subscription::WebhookSubscription;

//! Webhook subscription management.

pub mod subscription;

pub use subscription::{CreateSubscriptionRequest, SubscriptionService};

//! Delivery gateway.

pub mod sender;
pub mod signer;
pub mod target;

pub use sender::{DeliveryError, DeliveryOutcome, HttpWebhookSender, WebhookRequest, WebhookSender};
pub use signer::WebhookSigner;
pub use target::{TargetValidationError, TargetValidator};

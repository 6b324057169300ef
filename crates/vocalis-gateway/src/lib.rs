//! # vocalis-gateway
//!
//! Outbound edges of the system:
//!
//! - [`queue`]: resolves logical queue names to transport addresses (cached
//!   per instance) and publishes conversion messages.
//! - [`delivery`]: signs webhook bodies, validates subscription targets and
//!   performs the HTTPS POST.

pub mod delivery;
pub mod queue;

pub use delivery::{
    DeliveryError, DeliveryOutcome, HttpWebhookSender, TargetValidationError, TargetValidator,
    WebhookRequest, WebhookSender, WebhookSigner,
};
pub use queue::{
    CallbackDescriptor, ConversionMessage, MemoryQueueTransport, QueueError, QueueGateway,
    QueueTransport,
};

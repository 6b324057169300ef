//! Queue gateway.

pub mod gateway;
pub mod memory;
pub mod message;
#[cfg(feature = "sqs")]
pub mod sqs;
pub mod transport;

pub use gateway::QueueGateway;
pub use memory::MemoryQueueTransport;
pub use message::{CallbackDescriptor, ConversionMessage};
#[cfg(feature = "sqs")]
pub use sqs::SqsQueueTransport;
pub use transport::{QueueError, QueueTransport};

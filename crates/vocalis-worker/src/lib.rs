//! Background processors for Vocalis.
//!
//! This crate provides:
//! - A polling loop shared by both processors, with graceful drain on
//!   shutdown
//! - The conversion processor, which advances jobs whose preprocessing
//!   finished and dispatches queued jobs to the conversion queues
//! - The delivery processor, which drives webhook deliveries through
//!   claim, send, backoff and stuck-claim recovery
//!
//! Neither processor holds locks. Every state change is a compare-and-swap
//! on the row's version token, so any number of instances can poll the same
//! tables and at most one wins each transition.

pub mod backoff;
pub mod conversion;
pub mod delivery;
pub mod error;
pub mod payload;
pub mod router;
pub mod runner;

pub use backoff::BackoffPolicy;
pub use conversion::ConversionProcessor;
pub use delivery::DeliveryProcessor;
pub use error::ProcessError;
pub use router::{QueueKind, QueueRouter};
pub use runner::{CycleReport, PollingLoop, PollingProcessor, RowOutcome};

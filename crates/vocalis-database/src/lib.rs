//! # vocalis-database
//!
//! The job store: trait seams over the four tables the processors touch,
//! PostgreSQL repositories implementing them, and an in-memory store with
//! the same compare-and-swap contract.
//!
//! Every mutating write takes the version token the caller read. A write
//! whose token is stale matches no row and returns
//! [`AppError::version_conflict`](vocalis_core::AppError::version_conflict).

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use store::{AudioInputStore, ConversionJobStore, WebhookDeliveryStore, WebhookSubscriptionStore};

//! # vocalis-api
//!
//! HTTP boundary for Vocalis built on Axum.
//!
//! Only the endpoints the background pipeline needs are exposed: the
//! completion callback the conversion service calls and a health check.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;

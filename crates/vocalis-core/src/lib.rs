//! # vocalis-core
//!
//! Core crate for Vocalis. Contains configuration schemas, the clock
//! abstraction used by the background processors, and the unified error
//! system.
//!
//! This crate has **no** internal dependencies on other Vocalis crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;

//! Conversion job boundary services.

pub mod callback;
pub mod service;

pub use callback::{CallbackOutcome, CallbackService, CallbackStatus, ConversionCallback};
pub use service::{ConversionService, CreateConversionRequest};

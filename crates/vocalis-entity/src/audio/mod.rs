//! Uploaded audio inputs and their preprocessing state.

pub mod model;

pub use model::{AudioInput, PreprocessingStatus};

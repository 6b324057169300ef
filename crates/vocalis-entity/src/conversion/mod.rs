//! Conversion job entities.

pub mod model;
pub mod pitch;
pub mod status;

pub use model::ConversionJob;
pub use pitch::PitchShift;
pub use status::ConversionStatus;

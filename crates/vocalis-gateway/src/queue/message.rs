//! Payload consumed by the external conversion service.

use serde::{Deserialize, Serialize};

/// Where the conversion service reports completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackDescriptor {
    /// Callback endpoint.
    pub url: String,
    /// Protocol tag understood by the conversion service.
    pub protocol: String,
}

/// One conversion request on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMessage {
    /// Job identifier; the conversion service de-duplicates on it.
    pub job_id: String,
    /// Voice model weights key.
    pub model_path: String,
    /// Voice model index key.
    pub index_path: String,
    /// Signed semitone offset.
    pub pitch_shift: i32,
    /// Preprocessed audio key to read.
    pub input_key: String,
    /// Key to write the converted audio to.
    pub output_key: String,
    /// Completion callback, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackDescriptor>,
}

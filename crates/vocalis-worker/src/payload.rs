//! Conversion message construction.

use vocalis_core::config::ConversionConfig;
use vocalis_entity::conversion::ConversionJob;
use vocalis_gateway::{CallbackDescriptor, ConversionMessage};

/// The queue message for `job`, reading audio from `input_key`.
///
/// The output key is derived from the job id, so a redelivered message
/// overwrites the same object.
pub fn conversion_message(
    job: &ConversionJob,
    input_key: &str,
    config: &ConversionConfig,
) -> ConversionMessage {
    ConversionMessage {
        job_id: job.id.to_string(),
        model_path: job.model_path.clone(),
        index_path: job.index_path.clone(),
        pitch_shift: job.pitch_shift.semitones(),
        input_key: input_key.to_string(),
        output_key: job.output_key_for(&config.output_prefix),
        callback: config
            .callback_url
            .as_ref()
            .filter(|url| !url.is_empty())
            .map(|url| CallbackDescriptor {
                url: url.clone(),
                protocol: config.callback_protocol.clone(),
            }),
    }
}

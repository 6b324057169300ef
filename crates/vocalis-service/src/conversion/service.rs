//! Conversion job creation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use vocalis_core::error::AppError;
use vocalis_core::result::AppResult;
use vocalis_core::traits::Clock;
use vocalis_database::store::{AudioInputStore, ConversionJobStore};
use vocalis_entity::audio::PreprocessingStatus;
use vocalis_entity::conversion::model::CreateConversionJob;
use vocalis_entity::conversion::{ConversionJob, ConversionStatus, PitchShift};

/// Request to convert an audio input with a voice model.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateConversionRequest {
    /// Requesting user.
    pub user_id: Uuid,
    /// Audio input to convert.
    pub audio_input_id: Uuid,
    /// Voice model to apply.
    pub voice_model_id: Uuid,
    /// Voice model weights key.
    #[validate(length(min = 1, message = "Model path is required"))]
    pub model_path: String,
    /// Voice model index key.
    #[validate(length(min = 1, message = "Index path is required"))]
    pub index_path: String,
    /// Pitch shift wire string, e.g. `fifth_up`.
    pub pitch_shift: String,
    /// Convert the preview clip only.
    #[serde(default)]
    pub use_preview: bool,
}

/// Creates conversion jobs in their initial state.
#[derive(Clone)]
pub struct ConversionService {
    jobs: Arc<dyn ConversionJobStore>,
    inputs: Arc<dyn AudioInputStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService").finish_non_exhaustive()
    }
}

impl ConversionService {
    /// Creates a new conversion service.
    pub fn new(
        jobs: Arc<dyn ConversionJobStore>,
        inputs: Arc<dyn AudioInputStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            inputs,
            clock,
        }
    }

    /// Create a job. It starts `Queued` when the input is already
    /// preprocessed and `PendingPreprocessing` otherwise.
    pub async fn create_job(&self, request: CreateConversionRequest) -> AppResult<ConversionJob> {
        request
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let pitch_shift = PitchShift::from_wire_str(&request.pitch_shift)
            .map_err(|e| AppError::validation(e.to_string()))?;

        let input = self
            .inputs
            .find_by_id(request.audio_input_id)
            .await?
            .filter(|input| input.user_id == request.user_id)
            .ok_or_else(|| {
                AppError::not_found(format!("Audio input {} not found", request.audio_input_id))
            })?;

        let status = match input.preprocessing_status {
            PreprocessingStatus::Completed => {
                if input.conversion_source(request.use_preview).is_none() {
                    return Err(AppError::validation(
                        "Audio input has no preprocessed audio for the requested clip",
                    ));
                }
                ConversionStatus::Queued
            }
            PreprocessingStatus::Pending => ConversionStatus::PendingPreprocessing,
            PreprocessingStatus::Failed => {
                return Err(AppError::validation(format!(
                    "Audio input preprocessing failed: {}",
                    input.failure_reason.as_deref().unwrap_or("unknown reason")
                )));
            }
        };

        let job = ConversionJob::new(
            CreateConversionJob {
                user_id: request.user_id,
                audio_input_id: request.audio_input_id,
                voice_model_id: request.voice_model_id,
                model_path: request.model_path,
                index_path: request.index_path,
                pitch_shift,
                use_preview: request.use_preview,
            },
            status,
            self.clock.now(),
        );
        let job = self.jobs.insert(&job).await?;

        info!(
            job_id = %job.id,
            user_id = %job.user_id,
            status = %job.status,
            pitch_shift = %job.pitch_shift,
            "Created conversion job"
        );
        Ok(job)
    }
}

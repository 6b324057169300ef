//! Conversion job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::pitch::PitchShift;
use super::status::ConversionStatus;

/// A request to convert one audio input with one voice model.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversionJob {
    /// Unique job identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Audio input being converted.
    pub audio_input_id: Uuid,
    /// Voice model applied.
    pub voice_model_id: Uuid,
    /// Storage key of the voice model weights.
    pub model_path: String,
    /// Storage key of the voice model feature index.
    pub index_path: String,
    /// Requested transposition.
    #[sqlx(try_from = "i16")]
    pub pitch_shift: PitchShift,
    /// Convert the short preview clip instead of the full input.
    pub use_preview: bool,
    /// Current lifecycle status.
    pub status: ConversionStatus,
    /// Attempts that failed to advance the job.
    pub retry_count: i32,
    /// When the last unsuccessful attempt happened.
    pub last_retry_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token, bumped on every write.
    pub version: i64,
    /// Storage key of the converted audio, set on completion.
    pub output_key: Option<String>,
    /// Failure description when `status` is `failed`.
    pub error_message: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was handed to the conversion service.
    pub processing_started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Data required to create a new conversion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversionJob {
    /// Owning user.
    pub user_id: Uuid,
    /// Audio input to convert.
    pub audio_input_id: Uuid,
    /// Voice model to apply.
    pub voice_model_id: Uuid,
    /// Voice model weights key.
    pub model_path: String,
    /// Voice model index key.
    pub index_path: String,
    /// Requested transposition.
    pub pitch_shift: PitchShift,
    /// Convert the preview clip.
    pub use_preview: bool,
}

impl ConversionJob {
    /// Build a fresh row in the given initial status.
    pub fn new(data: CreateConversionJob, status: ConversionStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: data.user_id,
            audio_input_id: data.audio_input_id,
            voice_model_id: data.voice_model_id,
            model_path: data.model_path,
            index_path: data.index_path,
            pitch_shift: data.pitch_shift,
            use_preview: data.use_preview,
            status,
            retry_count: 0,
            last_retry_at: None,
            version: 0,
            output_key: None,
            error_message: None,
            created_at: now,
            processing_started_at: None,
            completed_at: None,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether the job may be attempted again at `now`.
    ///
    /// Requires remaining retries and at least `retry_delay` since the last
    /// unsuccessful attempt. A job that was never retried is always eligible.
    pub fn is_retry_eligible(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
    ) -> bool {
        self.retry_count < max_retries
            && self
                .last_retry_at
                .is_none_or(|last| last + retry_delay <= now)
    }

    /// Whether the retry budget is used up.
    pub fn is_retry_exhausted(&self, max_retries: i32) -> bool {
        self.retry_count >= max_retries
    }

    /// Whether a `Processing` claim is older than `threshold` at `now`.
    /// Such a job was abandoned between claim and publish, or its callback
    /// never arrived.
    pub fn is_dispatch_stuck(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        self.status == ConversionStatus::Processing
            && self
                .processing_started_at
                .is_none_or(|at| at < now - threshold)
    }

    /// Deterministic storage key for this job's converted audio.
    pub fn output_key_for(&self, prefix: &str) -> String {
        format!(
            "{}/{}/{}.wav",
            prefix.trim_end_matches('/'),
            self.user_id,
            self.id
        )
    }

    /// Count one unsuccessful attempt.
    pub fn record_retry(&mut self, now: DateTime<Utc>) {
        self.retry_count += 1;
        self.last_retry_at = Some(now);
        self.updated_at = now;
    }

    /// Preprocessing finished; the job can be dispatched.
    pub fn mark_queued(&mut self, now: DateTime<Utc>) {
        self.status = ConversionStatus::Queued;
        self.updated_at = now;
    }

    /// Claim the job for dispatch.
    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = ConversionStatus::Processing;
        self.processing_started_at = Some(now);
        self.updated_at = now;
    }

    /// Undo a dispatch claim after a transient publish failure.
    pub fn revert_to_queued(&mut self, now: DateTime<Utc>) {
        self.status = ConversionStatus::Queued;
        self.processing_started_at = None;
        self.record_retry(now);
    }

    /// Record a successful conversion.
    pub fn mark_completed(&mut self, output_key: String, completed_at: DateTime<Utc>) {
        self.status = ConversionStatus::Completed;
        self.output_key = Some(output_key);
        self.error_message = None;
        self.completed_at = Some(completed_at);
        self.updated_at = completed_at;
    }

    /// Give up on the job.
    pub fn mark_failed(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = ConversionStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
        self.updated_at = now;
    }
}

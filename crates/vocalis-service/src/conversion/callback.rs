//! Completion callback from the conversion service.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vocalis_core::config::CallbackConfig;
use vocalis_core::error::AppError;
use vocalis_core::result::AppResult;
use vocalis_core::traits::Clock;
use vocalis_database::store::ConversionJobStore;
use vocalis_entity::conversion::{ConversionJob, ConversionStatus};
use vocalis_entity::webhook::WebhookEvent;

use crate::events::EventPublisher;

/// Final status reported by the conversion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    /// Output was written.
    Completed,
    /// Conversion failed.
    Failed,
}

/// Callback body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionCallback {
    /// Job the callback is about.
    pub job_id: Uuid,
    /// Outcome.
    pub status: CallbackStatus,
    /// Where the conversion service says it wrote the output. Never stored:
    /// the job records its own deterministic key.
    #[serde(default)]
    pub output_key: Option<String>,
    /// Failure description for `failed`.
    #[serde(default)]
    pub error: Option<String>,
    /// When the conversion finished; defaults to receipt time.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a callback did.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    /// The job moved to a terminal state.
    Applied(ConversionJob),
    /// The job was already terminal; nothing changed.
    AlreadyFinal(ConversionJob),
}

impl CallbackOutcome {
    /// The job as it now stands.
    pub fn job(&self) -> &ConversionJob {
        match self {
            Self::Applied(job) | Self::AlreadyFinal(job) => job,
        }
    }
}

/// Applies completion callbacks to `Processing` jobs.
#[derive(Clone)]
pub struct CallbackService {
    jobs: Arc<dyn ConversionJobStore>,
    events: Arc<dyn EventPublisher>,
    secret_digest: Option<[u8; 32]>,
    output_prefix: String,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CallbackService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackService")
            .field("configured", &self.secret_digest.is_some())
            .finish_non_exhaustive()
    }
}

fn digest(value: &str) -> [u8; 32] {
    Sha256::digest(value.as_bytes()).into()
}

impl CallbackService {
    /// Creates a new callback service. An empty shared secret rejects every
    /// callback.
    pub fn new(
        jobs: Arc<dyn ConversionJobStore>,
        events: Arc<dyn EventPublisher>,
        config: &CallbackConfig,
        output_prefix: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let secret_digest = (!config.shared_secret.is_empty()).then(|| digest(&config.shared_secret));
        Self {
            jobs,
            events,
            secret_digest,
            output_prefix: output_prefix.to_string(),
            clock,
        }
    }

    /// Check the presented secret. Both sides are hashed first so the
    /// comparison runs over fixed-length digests.
    pub fn authenticate(&self, presented: Option<&str>) -> AppResult<()> {
        let Some(expected) = self.secret_digest else {
            return Err(AppError::authentication("Callback secret is not configured"));
        };
        let presented = presented.ok_or_else(|| AppError::authentication("Missing callback secret"))?;

        let actual = digest(presented);
        let diff = expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        if diff == 0 {
            Ok(())
        } else {
            Err(AppError::authentication("Invalid callback secret"))
        }
    }

    /// Authenticate and apply a callback.
    ///
    /// Replays against a terminal job are no-ops. A version conflict is
    /// returned to the caller, which retries; the retry then sees the
    /// terminal state.
    pub async fn handle(
        &self,
        presented_secret: Option<&str>,
        callback: ConversionCallback,
    ) -> AppResult<CallbackOutcome> {
        self.authenticate(presented_secret)?;

        let mut job = self
            .jobs
            .find_by_id(callback.job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Conversion job {} not found", callback.job_id)))?;

        if job.status.is_terminal() {
            debug!(job_id = %job.id, status = %job.status, "Callback for finished job ignored");
            return Ok(CallbackOutcome::AlreadyFinal(job));
        }
        if job.status != ConversionStatus::Processing {
            return Err(AppError::conflict(format!(
                "Conversion job {} is {}, not processing",
                job.id, job.status
            )));
        }

        let now = self.clock.now();
        let finished_at = callback.completed_at.unwrap_or(now);
        let expected_version = job.version;
        match callback.status {
            CallbackStatus::Completed => {
                let output_key = job.output_key_for(&self.output_prefix);
                if callback
                    .output_key
                    .as_deref()
                    .is_some_and(|reported| reported != output_key)
                {
                    // The reported value may be a signed URL; it is not logged.
                    warn!(
                        job_id = %job.id,
                        output_key = %output_key,
                        "Callback reported a different output location, ignored"
                    );
                }
                job.mark_completed(output_key, finished_at);
            }
            CallbackStatus::Failed => {
                let error = callback
                    .error
                    .unwrap_or_else(|| "Conversion failed".to_string());
                job.mark_failed(error, finished_at);
            }
        }

        let job = self.jobs.update(&job, expected_version).await?;
        info!(
            job_id = %job.id,
            status = %job.status,
            retry_count = job.retry_count,
            "Applied conversion callback"
        );

        let event = match (&job.status, &job.output_key) {
            (ConversionStatus::Completed, Some(output_key)) => WebhookEvent::ConversionCompleted {
                job_id: job.id,
                user_id: job.user_id,
                audio_input_id: job.audio_input_id,
                voice_model_id: job.voice_model_id,
                output_key: output_key.clone(),
                completed_at: finished_at,
            },
            _ => WebhookEvent::ConversionFailed {
                job_id: job.id,
                user_id: job.user_id,
                audio_input_id: job.audio_input_id,
                voice_model_id: job.voice_model_id,
                error: job.error_message.clone().unwrap_or_default(),
                failed_at: finished_at,
            },
        };
        if let Err(e) = self.events.publish(event).await {
            warn!(job_id = %job.id, error = %e, "Failed to fan out conversion event");
        }

        Ok(CallbackOutcome::Applied(job))
    }
}

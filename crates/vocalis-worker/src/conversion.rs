//! Conversion processor: advances preprocessed jobs and dispatches queued
//! jobs to the conversion queues.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vocalis_core::config::ConversionConfig;
use vocalis_core::result::AppResult;
use vocalis_core::traits::Clock;
use vocalis_database::store::{AudioInputStore, ConversionJobStore};
use vocalis_entity::audio::PreprocessingStatus;
use vocalis_entity::conversion::{ConversionJob, ConversionStatus};
use vocalis_entity::webhook::WebhookEvent;
use vocalis_gateway::QueueGateway;
use vocalis_service::EventPublisher;

use crate::error::ProcessError;
use crate::payload::conversion_message;
use crate::router::QueueRouter;
use crate::runner::{CycleReport, PollingLoop, PollingProcessor, RowOutcome, RowResult};

/// Drives conversion jobs from `PendingPreprocessing` through `Queued` to
/// `Processing`.
#[derive(Clone)]
pub struct ConversionProcessor {
    jobs: Arc<dyn ConversionJobStore>,
    inputs: Arc<dyn AudioInputStore>,
    gateway: Arc<QueueGateway>,
    router: QueueRouter,
    events: Arc<dyn EventPublisher>,
    config: ConversionConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ConversionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionProcessor")
            .field("router", &self.router)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConversionProcessor {
    /// Create a new conversion processor.
    pub fn new(
        jobs: Arc<dyn ConversionJobStore>,
        inputs: Arc<dyn AudioInputStore>,
        gateway: Arc<QueueGateway>,
        router: QueueRouter,
        events: Arc<dyn EventPublisher>,
        config: ConversionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            inputs,
            gateway,
            router,
            events,
            config,
            clock,
        }
    }

    /// Poll until cancelled.
    pub async fn run(self: Arc<Self>, cancel: watch::Receiver<bool>) {
        PollingLoop::new(self).run(cancel).await;
    }

    /// Re-check one `PendingPreprocessing` job against its audio input.
    pub async fn process_pending(&self, id: Uuid) -> RowResult {
        let Some(mut job) = self.jobs.find_by_id(id).await? else {
            return Ok(RowOutcome::Skipped);
        };
        if job.status != ConversionStatus::PendingPreprocessing {
            return Ok(RowOutcome::Skipped);
        }

        let now = self.clock.now();
        let max_retries = self.config.max_retry_attempts;
        let expected_version = job.version;

        if job.is_retry_exhausted(max_retries) {
            job.mark_failed(
                format!("Preprocessing did not complete after {max_retries} attempts"),
                now,
            );
            return self.fail(job, expected_version).await;
        }
        if !job.is_retry_eligible(now, max_retries, self.config.retry_delay()) {
            return Ok(RowOutcome::Skipped);
        }

        let Some(input) = self.inputs.find_by_id(job.audio_input_id).await? else {
            job.mark_failed("Audio input no longer exists", now);
            return self.fail(job, expected_version).await;
        };

        match input.preprocessing_status {
            PreprocessingStatus::Failed => {
                let reason = input.failure_reason.as_deref().unwrap_or("unknown reason");
                job.mark_failed(format!("Audio preprocessing failed: {reason}"), now);
                self.fail(job, expected_version).await
            }
            PreprocessingStatus::Completed => {
                job.mark_queued(now);
                let job = self.jobs.update(&job, expected_version).await?;
                info!(
                    job_id = %job.id,
                    status = %job.status,
                    retry_count = job.retry_count,
                    "Preprocessing complete, job queued"
                );
                Ok(RowOutcome::Advanced)
            }
            PreprocessingStatus::Pending => {
                job.record_retry(now);
                let job = self.jobs.update(&job, expected_version).await?;
                debug!(
                    job_id = %job.id,
                    status = %job.status,
                    retry_count = job.retry_count,
                    "Preprocessing still pending"
                );
                Ok(RowOutcome::Retried)
            }
        }
    }

    /// Claim one `Queued` job and publish it to its conversion queue.
    ///
    /// The claim is written before the publish, so an instance that loses
    /// the race never sends anything.
    pub async fn dispatch_queued(&self, id: Uuid) -> RowResult {
        let Some(mut job) = self.jobs.find_by_id(id).await? else {
            return Ok(RowOutcome::Skipped);
        };
        if job.status != ConversionStatus::Queued {
            return Ok(RowOutcome::Skipped);
        }

        let now = self.clock.now();
        let max_retries = self.config.max_retry_attempts;
        let expected_version = job.version;

        if job.is_retry_exhausted(max_retries) {
            job.mark_failed(
                format!("Dispatch did not succeed after {max_retries} attempts"),
                now,
            );
            return self.fail(job, expected_version).await;
        }
        if !job.is_retry_eligible(now, max_retries, self.config.retry_delay()) {
            return Ok(RowOutcome::Skipped);
        }

        let input = self.inputs.find_by_id(job.audio_input_id).await?;
        let Some(input_key) = input
            .as_ref()
            .and_then(|input| input.conversion_source(job.use_preview))
        else {
            job.mark_failed("Preprocessed audio is not available", now);
            return self.fail(job, expected_version).await;
        };

        let kind = self.router.route(&job);
        let queue = self.router.queue_name(kind);
        let message = conversion_message(&job, input_key, &self.config);

        job.mark_processing(now);
        let job = self.jobs.update(&job, expected_version).await?;

        match self
            .gateway
            .publish(queue, &message)
            .await
            .map_err(ProcessError::from)
        {
            Ok(message_id) => {
                info!(
                    job_id = %job.id,
                    status = %job.status,
                    retry_count = job.retry_count,
                    queue,
                    queue_kind = %kind,
                    message_id = %message_id,
                    "Dispatched conversion job"
                );
                Ok(RowOutcome::Advanced)
            }
            Err(ProcessError::Permanent(reason)) => {
                let claimed_version = job.version;
                let mut job = job;
                job.mark_failed(format!("Dispatch to queue '{queue}' failed: {reason}"), now);
                self.fail(job, claimed_version).await
            }
            Err(e) => {
                let claimed_version = job.version;
                let mut job = job;
                job.revert_to_queued(now);
                let job = self.jobs.update(&job, claimed_version).await?;
                warn!(
                    job_id = %job.id,
                    status = %job.status,
                    retry_count = job.retry_count,
                    queue,
                    error = %e,
                    "Dispatch failed, job returned to queue"
                );
                Ok(RowOutcome::Retried)
            }
        }
    }

    /// Put a `Processing` job whose claim outlived the stuck threshold back
    /// in the queue, counting one retry.
    ///
    /// Covers a crash between claim and publish as well as a published
    /// message whose callback never arrived. The queued phase re-dispatches
    /// the job once the retry delay has passed, or fails it when retries are
    /// used up.
    pub async fn recover_stuck(&self, id: Uuid) -> RowResult {
        let Some(mut job) = self.jobs.find_by_id(id).await? else {
            return Ok(RowOutcome::Skipped);
        };
        let now = self.clock.now();
        if !job.is_dispatch_stuck(now, self.config.dispatch_stuck_threshold()) {
            return Ok(RowOutcome::Skipped);
        }

        let expected_version = job.version;
        let claimed_at = job.processing_started_at;
        job.revert_to_queued(now);
        let job = self.jobs.update(&job, expected_version).await?;
        warn!(
            job_id = %job.id,
            status = %job.status,
            retry_count = job.retry_count,
            claimed_at = ?claimed_at,
            "Dispatch claim abandoned, job returned to queue"
        );
        Ok(RowOutcome::Retried)
    }

    /// Write a job that was just marked failed and announce it.
    async fn fail(&self, job: ConversionJob, expected_version: i64) -> RowResult {
        let job = self.jobs.update(&job, expected_version).await?;
        let reason = job.error_message.clone().unwrap_or_default();
        error!(
            job_id = %job.id,
            status = %job.status,
            retry_count = job.retry_count,
            reason = %reason,
            "Conversion job failed"
        );

        let event = WebhookEvent::ConversionFailed {
            job_id: job.id,
            user_id: job.user_id,
            audio_input_id: job.audio_input_id,
            voice_model_id: job.voice_model_id,
            error: reason,
            failed_at: job.completed_at.unwrap_or(job.updated_at),
        };
        if let Err(e) = self.events.publish(event).await {
            warn!(job_id = %job.id, error = %e, "Failed to fan out conversion event");
        }
        Ok(RowOutcome::Failed)
    }

    async fn candidates(&self, queued: bool) -> AppResult<Vec<Uuid>> {
        let now = self.clock.now();
        let max = self.config.max_retry_attempts;
        let delay = self.config.retry_delay();
        let limit = self.config.batch_size;
        if queued {
            self.jobs.find_queued(now, max, delay, limit).await
        } else {
            self.jobs.find_retry_candidates(now, max, delay, limit).await
        }
    }

    async fn stuck_candidates(&self) -> AppResult<Vec<Uuid>> {
        let stuck_before = self.clock.now() - self.config.dispatch_stuck_threshold();
        self.jobs
            .find_stuck_processing(stuck_before, self.config.batch_size)
            .await
    }

    fn log_row_error(id: Uuid, e: &ProcessError) {
        if e.is_version_conflict() {
            debug!(job_id = %id, "Job changed by another instance, skipped");
        } else {
            error!(job_id = %id, error = %e, "Failed to process conversion job");
        }
    }
}

#[async_trait]
impl PollingProcessor for ConversionProcessor {
    fn name(&self) -> &'static str {
        "conversion"
    }

    fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    async fn poll_once(&self) -> CycleReport {
        let mut report = CycleReport::default();

        match self.candidates(false).await {
            Ok(ids) => {
                for id in ids {
                    let result = self.process_pending(id).await;
                    if let Err(e) = &result {
                        Self::log_row_error(id, e);
                    }
                    report.record(&result);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to query pending conversion jobs");
                report.errors += 1;
            }
        }

        match self.stuck_candidates().await {
            Ok(ids) => {
                for id in ids {
                    let result = self.recover_stuck(id).await;
                    if let Err(e) = &result {
                        Self::log_row_error(id, e);
                    }
                    report.record(&result);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to query stuck conversion jobs");
                report.errors += 1;
            }
        }

        match self.candidates(true).await {
            Ok(ids) => {
                for id in ids {
                    let result = self.dispatch_queued(id).await;
                    if let Err(e) = &result {
                        Self::log_row_error(id, e);
                    }
                    report.record(&result);
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to query queued conversion jobs");
                report.errors += 1;
            }
        }

        report
    }
}

//! In-memory job store using a Tokio mutex.
//!
//! Honors the same compare-and-swap contract as the PostgreSQL
//! repositories. Suitable for single-node local runs and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use vocalis_core::error::AppError;
use vocalis_core::result::AppResult;
use vocalis_entity::audio::AudioInput;
use vocalis_entity::conversion::{ConversionJob, ConversionStatus};
use vocalis_entity::webhook::{DeliveryStatus, WebhookDeliveryAttempt, WebhookSubscription};

use crate::store::{
    AudioInputStore, ConversionJobStore, WebhookDeliveryStore, WebhookSubscriptionStore,
};

#[derive(Debug, Default)]
struct InnerState {
    audio_inputs: HashMap<Uuid, AudioInput>,
    jobs: HashMap<Uuid, ConversionJob>,
    subscriptions: HashMap<Uuid, WebhookSubscription>,
    deliveries: HashMap<Uuid, WebhookDeliveryAttempt>,
}

/// All four stores backed by hash maps behind one mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<InnerState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery row, oldest first.
    pub async fn deliveries(&self) -> Vec<WebhookDeliveryAttempt> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.deliveries.values().cloned().collect();
        rows.sort_by_key(|d| (d.created_at, d.id));
        rows
    }
}

fn duplicate(entity: &str, id: Uuid) -> AppError {
    AppError::conflict(format!("{entity} {id} already exists"))
}

fn due_jobs(
    state: &InnerState,
    status: ConversionStatus,
    now: DateTime<Utc>,
    max_retries: i32,
    retry_delay: chrono::Duration,
    limit: u32,
) -> Vec<Uuid> {
    let mut due: Vec<&ConversionJob> = state
        .jobs
        .values()
        .filter(|job| job.status == status && job.deleted_at.is_none())
        .filter(|job| {
            job.is_retry_exhausted(max_retries)
                || job.is_retry_eligible(now, max_retries, retry_delay)
        })
        .collect();
    due.sort_by_key(|job| (job.created_at, job.id));
    due.into_iter().take(limit as usize).map(|job| job.id).collect()
}

#[async_trait]
impl ConversionJobStore for MemoryStore {
    async fn insert(&self, job: &ConversionJob) -> AppResult<ConversionJob> {
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(duplicate("conversion_job", job.id));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ConversionJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .get(&id)
            .filter(|job| job.deleted_at.is_none())
            .cloned())
    }

    async fn find_retry_candidates(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(due_jobs(
            &state,
            ConversionStatus::PendingPreprocessing,
            now,
            max_retries,
            retry_delay,
            limit,
        ))
    }

    async fn find_queued(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        Ok(due_jobs(
            &state,
            ConversionStatus::Queued,
            now,
            max_retries,
            retry_delay,
            limit,
        ))
    }

    async fn find_stuck_processing(
        &self,
        stuck_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut stuck: Vec<&ConversionJob> = state
            .jobs
            .values()
            .filter(|job| job.status == ConversionStatus::Processing && job.deleted_at.is_none())
            .filter(|job| job.processing_started_at.is_none_or(|at| at < stuck_before))
            .collect();
        stuck.sort_by_key(|job| (job.processing_started_at, job.id));
        Ok(stuck.into_iter().take(limit as usize).map(|job| job.id).collect())
    }

    async fn update(&self, job: &ConversionJob, expected_version: i64) -> AppResult<ConversionJob> {
        let mut state = self.state.lock().await;
        let stored = state
            .jobs
            .get_mut(&job.id)
            .filter(|stored| stored.version == expected_version && stored.deleted_at.is_none())
            .ok_or_else(|| AppError::version_conflict("conversion_job", job.id))?;

        stored.status = job.status;
        stored.retry_count = job.retry_count;
        stored.last_retry_at = job.last_retry_at;
        stored.output_key = job.output_key.clone();
        stored.error_message = job.error_message.clone();
        stored.processing_started_at = job.processing_started_at;
        stored.completed_at = job.completed_at;
        stored.updated_at = job.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[async_trait]
impl WebhookDeliveryStore for MemoryStore {
    async fn insert(&self, attempt: &WebhookDeliveryAttempt) -> AppResult<WebhookDeliveryAttempt> {
        let mut state = self.state.lock().await;
        if state.deliveries.contains_key(&attempt.id) {
            return Err(duplicate("webhook_delivery", attempt.id));
        }
        state.deliveries.insert(attempt.id, attempt.clone());
        Ok(attempt.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WebhookDeliveryAttempt>> {
        let state = self.state.lock().await;
        Ok(state.deliveries.get(&id).cloned())
    }

    async fn find_claimable(
        &self,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut due: Vec<&WebhookDeliveryAttempt> = state
            .deliveries
            .values()
            .filter(|d| match d.status {
                DeliveryStatus::Pending => d.next_retry_at.is_none_or(|at| at <= now),
                DeliveryStatus::Processing => {
                    d.last_attempted_at.is_none_or(|at| at < stuck_before)
                }
                DeliveryStatus::Delivered | DeliveryStatus::Failed => false,
            })
            .collect();
        due.sort_by_key(|d| (d.created_at, d.id));
        Ok(due.into_iter().take(limit as usize).map(|d| d.id).collect())
    }

    async fn update(
        &self,
        attempt: &WebhookDeliveryAttempt,
        expected_version: i64,
    ) -> AppResult<WebhookDeliveryAttempt> {
        let mut state = self.state.lock().await;
        let stored = state
            .deliveries
            .get_mut(&attempt.id)
            .filter(|stored| stored.version == expected_version)
            .ok_or_else(|| AppError::version_conflict("webhook_delivery", attempt.id))?;

        stored.status = attempt.status;
        stored.attempt_count = attempt.attempt_count;
        stored.next_retry_at = attempt.next_retry_at;
        stored.last_attempted_at = attempt.last_attempted_at;
        stored.delivered_at = attempt.delivered_at;
        stored.last_error = attempt.last_error.clone();
        stored.last_status_code = attempt.last_status_code;
        stored.updated_at = attempt.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[async_trait]
impl WebhookSubscriptionStore for MemoryStore {
    async fn insert(&self, subscription: &WebhookSubscription) -> AppResult<WebhookSubscription> {
        let mut state = self.state.lock().await;
        if state.subscriptions.contains_key(&subscription.id) {
            return Err(duplicate("webhook_subscription", subscription.id));
        }
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WebhookSubscription>> {
        let state = self.state.lock().await;
        Ok(state.subscriptions.get(&id).cloned())
    }

    async fn find_active_for_event(
        &self,
        user_id: Uuid,
        event_type: &str,
    ) -> AppResult<Vec<WebhookSubscription>> {
        let state = self.state.lock().await;
        let mut matching: Vec<WebhookSubscription> = state
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.subscribes_to(event_type))
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.created_at, s.id));
        Ok(matching)
    }

    async fn update(
        &self,
        subscription: &WebhookSubscription,
        expected_version: i64,
    ) -> AppResult<WebhookSubscription> {
        let mut state = self.state.lock().await;
        let stored = state
            .subscriptions
            .get_mut(&subscription.id)
            .filter(|stored| stored.version == expected_version)
            .ok_or_else(|| AppError::version_conflict("webhook_subscription", subscription.id))?;

        stored.url = subscription.url.clone();
        stored.event_types = subscription.event_types.clone();
        stored.is_active = subscription.is_active;
        stored.consecutive_failures = subscription.consecutive_failures;
        stored.disabled_at = subscription.disabled_at;
        stored.updated_at = subscription.updated_at;
        stored.version += 1;
        Ok(stored.clone())
    }
}

#[async_trait]
impl AudioInputStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AudioInput>> {
        let state = self.state.lock().await;
        Ok(state.audio_inputs.get(&id).cloned())
    }

    async fn insert(&self, input: &AudioInput) -> AppResult<AudioInput> {
        let mut state = self.state.lock().await;
        if state.audio_inputs.contains_key(&input.id) {
            return Err(duplicate("audio_input", input.id));
        }
        state.audio_inputs.insert(input.id, input.clone());
        Ok(input.clone())
    }
}

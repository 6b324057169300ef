//! Store traits used by the processors and services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use vocalis_core::result::AppResult;
use vocalis_entity::audio::AudioInput;
use vocalis_entity::conversion::ConversionJob;
use vocalis_entity::webhook::{WebhookDeliveryAttempt, WebhookSubscription};

/// Persistence for conversion jobs.
#[async_trait]
pub trait ConversionJobStore: Send + Sync + 'static {
    /// Insert a new job row as given.
    async fn insert(&self, job: &ConversionJob) -> AppResult<ConversionJob>;

    /// Load a job, ignoring soft-deleted rows.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ConversionJob>>;

    /// `PendingPreprocessing` jobs due for another look at `now`: those with
    /// retries left whose last attempt is at least `retry_delay` old, plus
    /// those that have used up `max_retries` and must be failed. Oldest first.
    async fn find_retry_candidates(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>>;

    /// `Queued` jobs due for dispatch, under the same spacing and exhaustion
    /// rules as [`find_retry_candidates`](Self::find_retry_candidates).
    async fn find_queued(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>>;

    /// `Processing` jobs claimed before `stuck_before` that never reached a
    /// terminal state. Oldest claim first.
    async fn find_stuck_processing(
        &self,
        stuck_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<Uuid>>;

    /// Write every mutable column of `job` if the stored version is still
    /// `expected_version`. Returns the row with its new version.
    async fn update(&self, job: &ConversionJob, expected_version: i64) -> AppResult<ConversionJob>;
}

/// Persistence for webhook delivery attempts.
#[async_trait]
pub trait WebhookDeliveryStore: Send + Sync + 'static {
    /// Insert a new delivery row.
    async fn insert(&self, attempt: &WebhookDeliveryAttempt) -> AppResult<WebhookDeliveryAttempt>;

    /// Load a delivery.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WebhookDeliveryAttempt>>;

    /// Deliveries that are `Pending` and due at `now`, or `Processing` with
    /// a claim older than `stuck_before`. Oldest first.
    async fn find_claimable(
        &self,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<Uuid>>;

    /// Compare-and-swap write.
    async fn update(
        &self,
        attempt: &WebhookDeliveryAttempt,
        expected_version: i64,
    ) -> AppResult<WebhookDeliveryAttempt>;
}

/// Persistence for webhook subscriptions.
#[async_trait]
pub trait WebhookSubscriptionStore: Send + Sync + 'static {
    /// Insert a new subscription.
    async fn insert(&self, subscription: &WebhookSubscription) -> AppResult<WebhookSubscription>;

    /// Load a subscription.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WebhookSubscription>>;

    /// Active subscriptions of `user_id` registered for `event_type`.
    async fn find_active_for_event(
        &self,
        user_id: Uuid,
        event_type: &str,
    ) -> AppResult<Vec<WebhookSubscription>>;

    /// Compare-and-swap write.
    async fn update(
        &self,
        subscription: &WebhookSubscription,
        expected_version: i64,
    ) -> AppResult<WebhookSubscription>;
}

/// Read access to uploaded audio inputs. Writes belong to the upload
/// pipeline; `insert` exists for seeding and tests.
#[async_trait]
pub trait AudioInputStore: Send + Sync + 'static {
    /// Load an audio input.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AudioInput>>;

    /// Insert an audio input row.
    async fn insert(&self, input: &AudioInput) -> AppResult<AudioInput>;
}

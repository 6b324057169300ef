//! Webhook delivery repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vocalis_core::error::{AppError, ErrorKind};
use vocalis_core::result::AppResult;
use vocalis_entity::webhook::WebhookDeliveryAttempt;

use crate::store::WebhookDeliveryStore;

/// Repository for the `webhook_deliveries` table.
#[derive(Debug, Clone)]
pub struct WebhookDeliveryRepository {
    pool: PgPool,
}

impl WebhookDeliveryRepository {
    /// Create a new webhook delivery repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookDeliveryStore for WebhookDeliveryRepository {
    async fn insert(&self, attempt: &WebhookDeliveryAttempt) -> AppResult<WebhookDeliveryAttempt> {
        sqlx::query_as::<_, WebhookDeliveryAttempt>(
            "INSERT INTO webhook_deliveries (id, subscription_id, event_type, entity_type, entity_id, \
             payload, status, attempt_count, next_retry_at, last_attempted_at, delivered_at, \
             last_error, last_status_code, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING *",
        )
        .bind(attempt.id)
        .bind(attempt.subscription_id)
        .bind(&attempt.event_type)
        .bind(&attempt.entity_type)
        .bind(attempt.entity_id)
        .bind(&attempt.payload)
        .bind(attempt.status)
        .bind(attempt.attempt_count)
        .bind(attempt.next_retry_at)
        .bind(attempt.last_attempted_at)
        .bind(attempt.delivered_at)
        .bind(&attempt.last_error)
        .bind(attempt.last_status_code)
        .bind(attempt.version)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create webhook delivery", e))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WebhookDeliveryAttempt>> {
        sqlx::query_as::<_, WebhookDeliveryAttempt>("SELECT * FROM webhook_deliveries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find webhook delivery", e))
    }

    async fn find_claimable(
        &self,
        now: DateTime<Utc>,
        stuck_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM webhook_deliveries \
             WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= $1)) \
                OR (status = 'processing' AND (last_attempted_at IS NULL OR last_attempted_at < $2)) \
             ORDER BY created_at ASC \
             LIMIT $3",
        )
        .bind(now)
        .bind(stuck_before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to poll webhook deliveries", e))
    }

    async fn update(
        &self,
        attempt: &WebhookDeliveryAttempt,
        expected_version: i64,
    ) -> AppResult<WebhookDeliveryAttempt> {
        sqlx::query_as::<_, WebhookDeliveryAttempt>(
            "UPDATE webhook_deliveries SET status = $3, attempt_count = $4, next_retry_at = $5, \
             last_attempted_at = $6, delivered_at = $7, last_error = $8, last_status_code = $9, \
             updated_at = $10, version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING *",
        )
        .bind(attempt.id)
        .bind(expected_version)
        .bind(attempt.status)
        .bind(attempt.attempt_count)
        .bind(attempt.next_retry_at)
        .bind(attempt.last_attempted_at)
        .bind(attempt.delivered_at)
        .bind(&attempt.last_error)
        .bind(attempt.last_status_code)
        .bind(attempt.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update webhook delivery", e))?
        .ok_or_else(|| AppError::version_conflict("webhook_delivery", attempt.id))
    }
}

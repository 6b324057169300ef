//! Webhook subscription repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use vocalis_core::error::{AppError, ErrorKind};
use vocalis_core::result::AppResult;
use vocalis_entity::webhook::WebhookSubscription;

use crate::store::WebhookSubscriptionStore;

/// Repository for the `webhook_subscriptions` table.
#[derive(Debug, Clone)]
pub struct WebhookSubscriptionRepository {
    pool: PgPool,
}

impl WebhookSubscriptionRepository {
    /// Create a new webhook subscription repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookSubscriptionStore for WebhookSubscriptionRepository {
    async fn insert(&self, subscription: &WebhookSubscription) -> AppResult<WebhookSubscription> {
        sqlx::query_as::<_, WebhookSubscription>(
            "INSERT INTO webhook_subscriptions (id, user_id, url, secret, event_types, is_active, \
             consecutive_failures, version, disabled_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(&subscription.url)
        .bind(&subscription.secret)
        .bind(&subscription.event_types)
        .bind(subscription.is_active)
        .bind(subscription.consecutive_failures)
        .bind(subscription.version)
        .bind(subscription.disabled_at)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create webhook subscription", e)
        })
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<WebhookSubscription>> {
        sqlx::query_as::<_, WebhookSubscription>("SELECT * FROM webhook_subscriptions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find webhook subscription", e)
            })
    }

    async fn find_active_for_event(
        &self,
        user_id: Uuid,
        event_type: &str,
    ) -> AppResult<Vec<WebhookSubscription>> {
        sqlx::query_as::<_, WebhookSubscription>(
            "SELECT * FROM webhook_subscriptions \
             WHERE user_id = $1 AND is_active AND $2 = ANY(event_types) \
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list webhook subscriptions", e)
        })
    }

    async fn update(
        &self,
        subscription: &WebhookSubscription,
        expected_version: i64,
    ) -> AppResult<WebhookSubscription> {
        sqlx::query_as::<_, WebhookSubscription>(
            "UPDATE webhook_subscriptions SET url = $3, event_types = $4, is_active = $5, \
             consecutive_failures = $6, disabled_at = $7, updated_at = $8, version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING *",
        )
        .bind(subscription.id)
        .bind(expected_version)
        .bind(&subscription.url)
        .bind(&subscription.event_types)
        .bind(subscription.is_active)
        .bind(subscription.consecutive_failures)
        .bind(subscription.disabled_at)
        .bind(subscription.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update webhook subscription", e)
        })?
        .ok_or_else(|| AppError::version_conflict("webhook_subscription", subscription.id))
    }
}

//! Conversion job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use vocalis_core::error::{AppError, ErrorKind};
use vocalis_core::result::AppResult;
use vocalis_entity::conversion::{ConversionJob, ConversionStatus};

use crate::store::ConversionJobStore;

/// Repository for the `conversion_jobs` table.
#[derive(Debug, Clone)]
pub struct ConversionJobRepository {
    pool: PgPool,
}

impl ConversionJobRepository {
    /// Create a new conversion job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_due(
        &self,
        status: ConversionStatus,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversion_jobs \
             WHERE status = $1 AND deleted_at IS NULL \
             AND (retry_count >= $2 OR last_retry_at IS NULL OR last_retry_at <= $3) \
             ORDER BY created_at ASC \
             LIMIT $4",
        )
        .bind(status)
        .bind(max_retries)
        .bind(now - retry_delay)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to poll {status} conversion jobs"),
                e,
            )
        })
    }
}

#[async_trait]
impl ConversionJobStore for ConversionJobRepository {
    async fn insert(&self, job: &ConversionJob) -> AppResult<ConversionJob> {
        sqlx::query_as::<_, ConversionJob>(
            "INSERT INTO conversion_jobs (id, user_id, audio_input_id, voice_model_id, model_path, \
             index_path, pitch_shift, use_preview, status, retry_count, last_retry_at, version, \
             output_key, error_message, created_at, processing_started_at, completed_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
             RETURNING *",
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.audio_input_id)
        .bind(job.voice_model_id)
        .bind(&job.model_path)
        .bind(&job.index_path)
        .bind(job.pitch_shift.semitones() as i16)
        .bind(job.use_preview)
        .bind(job.status)
        .bind(job.retry_count)
        .bind(job.last_retry_at)
        .bind(job.version)
        .bind(&job.output_key)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.processing_started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create conversion job", e))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<ConversionJob>> {
        sqlx::query_as::<_, ConversionJob>(
            "SELECT * FROM conversion_jobs WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find conversion job", e))
    }

    async fn find_retry_candidates(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        self.find_due(
            ConversionStatus::PendingPreprocessing,
            now,
            max_retries,
            retry_delay,
            limit,
        )
        .await
    }

    async fn find_queued(
        &self,
        now: DateTime<Utc>,
        max_retries: i32,
        retry_delay: chrono::Duration,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        self.find_due(ConversionStatus::Queued, now, max_retries, retry_delay, limit)
            .await
    }

    async fn find_stuck_processing(
        &self,
        stuck_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversion_jobs \
             WHERE status = $1 AND deleted_at IS NULL \
             AND (processing_started_at IS NULL OR processing_started_at < $2) \
             ORDER BY processing_started_at ASC NULLS FIRST \
             LIMIT $3",
        )
        .bind(ConversionStatus::Processing)
        .bind(stuck_before)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to poll stuck conversion jobs", e)
        })
    }

    async fn update(&self, job: &ConversionJob, expected_version: i64) -> AppResult<ConversionJob> {
        sqlx::query_as::<_, ConversionJob>(
            "UPDATE conversion_jobs SET status = $3, retry_count = $4, last_retry_at = $5, \
             output_key = $6, error_message = $7, processing_started_at = $8, completed_at = $9, \
             updated_at = $10, version = version + 1 \
             WHERE id = $1 AND version = $2 AND deleted_at IS NULL \
             RETURNING *",
        )
        .bind(job.id)
        .bind(expected_version)
        .bind(job.status)
        .bind(job.retry_count)
        .bind(job.last_retry_at)
        .bind(&job.output_key)
        .bind(&job.error_message)
        .bind(job.processing_started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update conversion job", e))?
        .ok_or_else(|| AppError::version_conflict("conversion_job", job.id))
    }
}

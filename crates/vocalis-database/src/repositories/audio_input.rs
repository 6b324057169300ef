//! Audio input repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use vocalis_core::error::{AppError, ErrorKind};
use vocalis_core::result::AppResult;
use vocalis_entity::audio::AudioInput;

use crate::store::AudioInputStore;

/// Repository for the `audio_inputs` table.
#[derive(Debug, Clone)]
pub struct AudioInputRepository {
    pool: PgPool,
}

impl AudioInputRepository {
    /// Create a new audio input repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AudioInputStore for AudioInputRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<AudioInput>> {
        sqlx::query_as::<_, AudioInput>("SELECT * FROM audio_inputs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find audio input", e))
    }

    async fn insert(&self, input: &AudioInput) -> AppResult<AudioInput> {
        sqlx::query_as::<_, AudioInput>(
            "INSERT INTO audio_inputs (id, user_id, original_key, preprocessing_status, \
             preprocessed_key, preview_key, failure_reason, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(input.id)
        .bind(input.user_id)
        .bind(&input.original_key)
        .bind(input.preprocessing_status)
        .bind(&input.preprocessed_key)
        .bind(&input.preview_key)
        .bind(&input.failure_reason)
        .bind(input.created_at)
        .bind(input.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create audio input", e))
    }
}

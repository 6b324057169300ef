//! Audio input entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// State of the upstream preprocessing step (separation, normalisation,
/// preview extraction) for an uploaded audio file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "preprocessing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PreprocessingStatus {
    /// Still running.
    Pending,
    /// Outputs are available.
    Completed,
    /// Preprocessing failed.
    Failed,
}

impl PreprocessingStatus {
    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PreprocessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An uploaded audio file. Owned by the upload pipeline; the processors
/// only read it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AudioInput {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning user.
    pub user_id: Uuid,
    /// Storage key of the original upload.
    pub original_key: String,
    /// Preprocessing state.
    pub preprocessing_status: PreprocessingStatus,
    /// Storage key of the full preprocessed audio.
    pub preprocessed_key: Option<String>,
    /// Storage key of the preprocessed preview clip.
    pub preview_key: Option<String>,
    /// Why preprocessing failed.
    pub failure_reason: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl AudioInput {
    /// The key the conversion service should read, if preprocessing produced it.
    pub fn conversion_source(&self, use_preview: bool) -> Option<&str> {
        if use_preview {
            self.preview_key.as_deref()
        } else {
            self.preprocessed_key.as_deref()
        }
    }
}

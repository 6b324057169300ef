//! Outbound webhook event payloads.
//!
//! Payloads are persisted with the delivery row and replayed verbatim on
//! retries, so they only ever carry identifiers and storage keys. Anything
//! time-limited (presigned URLs) is resolved by the receiver on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// `conversion.completed`
pub const CONVERSION_COMPLETED: &str = "conversion.completed";
/// `conversion.failed`
pub const CONVERSION_FAILED: &str = "conversion.failed";
/// `webhook.test`
pub const WEBHOOK_TEST: &str = "webhook.test";

/// Event types a subscription may register for.
pub const SUBSCRIBABLE_EVENTS: [&str; 2] = [CONVERSION_COMPLETED, CONVERSION_FAILED];

/// A domain event that fans out to matching subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum WebhookEvent {
    /// A conversion produced output.
    ConversionCompleted {
        /// Job identifier.
        job_id: Uuid,
        /// Owning user.
        user_id: Uuid,
        /// Converted audio input.
        audio_input_id: Uuid,
        /// Applied voice model.
        voice_model_id: Uuid,
        /// Storage key of the output.
        output_key: String,
        /// When the conversion finished.
        completed_at: DateTime<Utc>,
    },
    /// A conversion was given up on.
    ConversionFailed {
        /// Job identifier.
        job_id: Uuid,
        /// Owning user.
        user_id: Uuid,
        /// Audio input.
        audio_input_id: Uuid,
        /// Voice model.
        voice_model_id: Uuid,
        /// Failure description.
        error: String,
        /// When the job was failed.
        failed_at: DateTime<Utc>,
    },
    /// Connectivity check requested by the subscription owner.
    Test {
        /// Subscription being tested.
        subscription_id: Uuid,
    },
}

impl WebhookEvent {
    /// Dotted event type sent in `X-Webhook-Event`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversionCompleted { .. } => CONVERSION_COMPLETED,
            Self::ConversionFailed { .. } => CONVERSION_FAILED,
            Self::Test { .. } => WEBHOOK_TEST,
        }
    }

    /// Kind of entity the event is about.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::ConversionCompleted { .. } | Self::ConversionFailed { .. } => "conversion_job",
            Self::Test { .. } => "webhook_subscription",
        }
    }

    /// Identifier of that entity.
    pub fn entity_id(&self) -> Uuid {
        match self {
            Self::ConversionCompleted { job_id, .. } | Self::ConversionFailed { job_id, .. } => {
                *job_id
            }
            Self::Test { subscription_id } => *subscription_id,
        }
    }

    /// Owner of the entity, used to scope fan-out. Test events are sent
    /// directly and have no owner lookup.
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::ConversionCompleted { user_id, .. } | Self::ConversionFailed { user_id, .. } => {
                Some(*user_id)
            }
            Self::Test { .. } => None,
        }
    }

    /// JSON body for delivery `delivery_id`.
    pub fn payload(&self, delivery_id: Uuid, created_at: DateTime<Utc>) -> serde_json::Value {
        let data = match self {
            Self::ConversionCompleted {
                job_id,
                audio_input_id,
                voice_model_id,
                output_key,
                completed_at,
                ..
            } => json!({
                "job_id": job_id,
                "audio_input_id": audio_input_id,
                "voice_model_id": voice_model_id,
                "status": "completed",
                "output_key": output_key,
                "completed_at": completed_at,
            }),
            Self::ConversionFailed {
                job_id,
                audio_input_id,
                voice_model_id,
                error,
                failed_at,
                ..
            } => json!({
                "job_id": job_id,
                "audio_input_id": audio_input_id,
                "voice_model_id": voice_model_id,
                "status": "failed",
                "error": error,
                "failed_at": failed_at,
            }),
            Self::Test { subscription_id } => json!({
                "subscription_id": subscription_id,
                "message": "Test event from Vocalis",
            }),
        };

        json!({
            "id": delivery_id,
            "event": self.event_type(),
            "entity_type": self.entity_type(),
            "entity_id": self.entity_id(),
            "created_at": created_at,
            "data": data,
        })
    }
}

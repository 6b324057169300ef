//! Outbound webhook HTTP delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use vocalis_core::config::DeliveryConfig;
use vocalis_core::error::{AppError, ErrorKind};
use vocalis_core::result::AppResult;

use super::signer::WebhookSigner;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the send time as Unix seconds.
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
/// Header carrying the delivery id.
pub const ID_HEADER: &str = "X-Webhook-Id";
/// Header carrying the event type.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// A fully signed request ready to send.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Delivery identifier.
    pub delivery_id: Uuid,
    /// Target URL.
    pub url: String,
    /// Event type.
    pub event_type: String,
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Exact body bytes that were signed.
    pub body: Vec<u8>,
    /// `sha256={hex}` signature of `body`.
    pub signature: String,
}

impl WebhookRequest {
    /// Serialize `payload` and sign it with `secret`.
    pub fn signed(
        delivery_id: Uuid,
        url: impl Into<String>,
        event_type: impl Into<String>,
        secret: &str,
        payload: &serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(payload)?;
        let signature = WebhookSigner::sign(secret, &body);
        Ok(Self {
            delivery_id,
            url: url.into(),
            event_type: event_type.into(),
            timestamp,
            body,
            signature,
        })
    }

    /// The four webhook headers.
    pub fn headers(&self) -> [(&'static str, String); 4] {
        [
            (SIGNATURE_HEADER, self.signature.clone()),
            (TIMESTAMP_HEADER, self.timestamp.timestamp().to_string()),
            (ID_HEADER, self.delivery_id.to_string()),
            (EVENT_HEADER, self.event_type.clone()),
        ]
    }
}

/// A 2xx answer from the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// HTTP status received.
    pub status_code: u16,
}

/// Why a delivery attempt did not succeed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-2xx status.
    #[error("endpoint returned HTTP {0}")]
    Status(u16),
    /// No answer within the request timeout.
    #[error("request timed out")]
    Timeout,
    /// Connection, TLS or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// HTTP status, if the endpoint answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Timeout | Self::Transport(_) => None,
        }
    }
}

/// Performs one webhook POST.
#[async_trait]
pub trait WebhookSender: Send + Sync + std::fmt::Debug + 'static {
    /// Send `request`; success means a 2xx status.
    async fn send(&self, request: &WebhookRequest) -> Result<DeliveryOutcome, DeliveryError>;
}

/// [`WebhookSender`] over a shared reqwest client.
///
/// Redirects are not followed: a target is validated once at subscription
/// time and a redirect could point anywhere.
#[derive(Debug, Clone)]
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    /// Build the client from delivery configuration.
    pub fn new(config: &DeliveryConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build webhook client", e)
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, request: &WebhookRequest) -> Result<DeliveryOutcome, DeliveryError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body.clone());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        debug!(
            delivery_id = %request.delivery_id,
            status = status.as_u16(),
            "Webhook endpoint responded"
        );
        if status.is_success() {
            Ok(DeliveryOutcome {
                status_code: status.as_u16(),
            })
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

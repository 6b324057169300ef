//! Amazon SQS transport (requires the `sqs` feature).

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::error::DisplayErrorContext;
use tracing::info;

use vocalis_core::config::QueueConfig;

use super::transport::{QueueError, QueueTransport};

/// Queue transport backed by SQS `GetQueueUrl` / `SendMessage`.
#[derive(Debug, Clone)]
pub struct SqsQueueTransport {
    client: Client,
}

impl SqsQueueTransport {
    /// Build a client from the ambient AWS configuration, honouring the
    /// configured region and endpoint overrides.
    pub async fn new(config: &QueueConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        info!(
            region = ?config.region,
            endpoint = ?config.endpoint,
            "Initialized SQS queue transport"
        );
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl QueueTransport for SqsQueueTransport {
    async fn resolve(&self, name: &str) -> Result<String, QueueError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_queue_does_not_exist())
                {
                    QueueError::QueueNotFound(name.to_string())
                } else {
                    QueueError::Resolution {
                        name: name.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| QueueError::Resolution {
                name: name.to_string(),
                message: "GetQueueUrl returned no URL".to_string(),
            })
    }

    async fn publish(&self, address: &str, body: &str) -> Result<String, QueueError> {
        let output = self
            .client
            .send_message()
            .queue_url(address)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Publish(DisplayErrorContext(&e).to_string()))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }
}

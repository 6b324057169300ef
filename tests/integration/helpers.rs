//! Shared fixtures for the integration suite: an in-memory pipeline with a
//! manual clock, the in-memory queue transport and a recording webhook
//! sender.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use vocalis_core::config::{CallbackConfig, ConversionConfig, DeliveryConfig, QueueConfig};
use vocalis_core::traits::{Clock, ManualClock};
use vocalis_database::MemoryStore;
use vocalis_database::store::{
    AudioInputStore, ConversionJobStore, WebhookDeliveryStore, WebhookSubscriptionStore,
};
use vocalis_entity::audio::{AudioInput, PreprocessingStatus};
use vocalis_entity::conversion::model::CreateConversionJob;
use vocalis_entity::conversion::{ConversionJob, ConversionStatus, PitchShift};
use vocalis_entity::webhook::subscription::CreateWebhookSubscription;
use vocalis_entity::webhook::{WebhookDeliveryAttempt, WebhookEvent, WebhookSubscription};
use vocalis_gateway::{
    DeliveryError, DeliveryOutcome, MemoryQueueTransport, QueueGateway, WebhookRequest,
    WebhookSender,
};
use vocalis_service::{CallbackService, EventPublisher, WebhookEventPublisher};
use vocalis_worker::{ConversionProcessor, DeliveryProcessor, QueueRouter};

pub const CALLBACK_SECRET: &str = "integration-callback-secret";
pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Webhook sender that records every request and answers 200, or 500
/// while `failing` is set.
#[derive(Debug, Default)]
pub struct RecordingSender {
    failing: AtomicBool,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, request: &WebhookRequest) -> Result<DeliveryOutcome, DeliveryError> {
        self.requests.lock().await.push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            Err(DeliveryError::Status(500))
        } else {
            Ok(DeliveryOutcome { status_code: 200 })
        }
    }
}

/// Everything a processor instance needs, over one shared store.
pub struct Pipeline {
    pub store: MemoryStore,
    pub transport: MemoryQueueTransport,
    pub clock: Arc<ManualClock>,
    pub sender: Arc<RecordingSender>,
    pub events: Arc<dyn EventPublisher>,
    pub conversion_config: ConversionConfig,
    pub delivery_config: DeliveryConfig,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_sender(RecordingSender::default())
    }

    pub fn with_sender(sender: RecordingSender) -> Self {
        let store = MemoryStore::new();
        let queues = QueueConfig::default();
        let transport = MemoryQueueTransport::with_queues([
            queues.main_queue,
            queues.alt_queue,
            queues.preview_queue,
        ]);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let events: Arc<dyn EventPublisher> = Arc::new(WebhookEventPublisher::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
        ));
        Self {
            store,
            transport,
            clock,
            sender: Arc::new(sender),
            events,
            conversion_config: ConversionConfig::default(),
            delivery_config: DeliveryConfig::default(),
        }
    }

    /// A conversion processor instance with its own gateway cache.
    pub fn conversion_processor(&self) -> ConversionProcessor {
        ConversionProcessor::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            Arc::new(QueueGateway::new(Arc::new(self.transport.clone()))),
            QueueRouter::new(&QueueConfig::default()),
            Arc::clone(&self.events),
            self.conversion_config.clone(),
            self.clock.clone(),
        )
    }

    /// A delivery processor instance.
    pub fn delivery_processor(&self) -> DeliveryProcessor {
        DeliveryProcessor::new(
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.sender.clone(),
            self.delivery_config.clone(),
            self.clock.clone(),
        )
    }

    pub fn callback_service(&self) -> CallbackService {
        let config = CallbackConfig {
            shared_secret: CALLBACK_SECRET.to_string(),
            header_name: "X-Callback-Secret".to_string(),
        };
        CallbackService::new(
            Arc::new(self.store.clone()),
            Arc::clone(&self.events),
            &config,
            &self.conversion_config.output_prefix,
            self.clock.clone(),
        )
    }

    pub async fn seed_input(&self, status: PreprocessingStatus) -> AudioInput {
        let now = self.clock.now();
        let input = AudioInput {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            original_key: "uploads/input.mp3".to_string(),
            preprocessing_status: status,
            preprocessed_key: (status == PreprocessingStatus::Completed)
                .then(|| "preprocessed/input.wav".to_string()),
            preview_key: (status == PreprocessingStatus::Completed)
                .then(|| "preprocessed/input-preview.wav".to_string()),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        AudioInputStore::insert(&self.store, &input).await.unwrap()
    }

    pub async fn seed_job(
        &self,
        input: &AudioInput,
        status: ConversionStatus,
        pitch_shift: PitchShift,
        use_preview: bool,
    ) -> ConversionJob {
        let job = ConversionJob::new(
            CreateConversionJob {
                user_id: input.user_id,
                audio_input_id: input.id,
                voice_model_id: Uuid::new_v4(),
                model_path: "models/voice.pth".to_string(),
                index_path: "models/voice.index".to_string(),
                pitch_shift,
                use_preview,
            },
            status,
            self.clock.now(),
        );
        ConversionJobStore::insert(&self.store, &job).await.unwrap()
    }

    /// Claim a queued job for dispatch without publishing it, as an instance
    /// that crashed right after its claim would leave it.
    pub async fn claim_without_publish(&self, job: &ConversionJob) -> ConversionJob {
        let mut claimed = job.clone();
        claimed.mark_processing(self.clock.now());
        ConversionJobStore::update(&self.store, &claimed, job.version)
            .await
            .unwrap()
    }

    pub async fn job(&self, id: Uuid) -> ConversionJob {
        ConversionJobStore::find_by_id(&self.store, id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn subscribe(&self, user_id: Uuid) -> WebhookSubscription {
        let subscription = WebhookSubscription::new(
            CreateWebhookSubscription {
                user_id,
                url: "https://93.184.216.34/vocalis".to_string(),
                secret: WEBHOOK_SECRET.to_string(),
                event_types: vec![
                    "conversion.completed".to_string(),
                    "conversion.failed".to_string(),
                ],
            },
            self.clock.now(),
        );
        WebhookSubscriptionStore::insert(&self.store, &subscription)
            .await
            .unwrap()
    }

    pub async fn subscription(&self, id: Uuid) -> WebhookSubscription {
        WebhookSubscriptionStore::find_by_id(&self.store, id)
            .await
            .unwrap()
            .unwrap()
    }

    /// Insert a pending `conversion.completed` delivery for `subscription`.
    pub async fn enqueue_delivery(&self, subscription: &WebhookSubscription) -> WebhookDeliveryAttempt {
        let event = WebhookEvent::ConversionCompleted {
            job_id: Uuid::new_v4(),
            user_id: subscription.user_id,
            audio_input_id: Uuid::new_v4(),
            voice_model_id: Uuid::new_v4(),
            output_key: "conversions/user/job.wav".to_string(),
            completed_at: self.clock.now(),
        };
        let attempt = WebhookDeliveryAttempt::for_event(subscription.id, &event, self.clock.now());
        WebhookDeliveryStore::insert(&self.store, &attempt).await.unwrap()
    }

    pub async fn delivery(&self, id: Uuid) -> WebhookDeliveryAttempt {
        WebhookDeliveryStore::find_by_id(&self.store, id)
            .await
            .unwrap()
            .unwrap()
    }
}

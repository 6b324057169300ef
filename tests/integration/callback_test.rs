//! Job creation through completion callback to a signed webhook.

use std::sync::Arc;

use uuid::Uuid;

use vocalis_entity::audio::PreprocessingStatus;
use vocalis_entity::conversion::ConversionStatus;
use vocalis_gateway::WebhookSigner;
use vocalis_service::conversion::{CallbackStatus, ConversionCallback, CreateConversionRequest};
use vocalis_service::ConversionService;
use vocalis_service::conversion::CallbackOutcome;
use vocalis_worker::PollingProcessor;

use crate::helpers::{CALLBACK_SECRET, Pipeline, WEBHOOK_SECRET};

fn conversion_service(p: &Pipeline) -> ConversionService {
    ConversionService::new(
        Arc::new(p.store.clone()),
        Arc::new(p.store.clone()),
        p.clock.clone(),
    )
}

#[tokio::test]
async fn test_completed_conversion_reaches_subscriber() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let subscription = p.subscribe(input.user_id).await;

    let job = conversion_service(&p)
        .create_job(CreateConversionRequest {
            user_id: input.user_id,
            audio_input_id: input.id,
            voice_model_id: Uuid::new_v4(),
            model_path: "models/voice.pth".to_string(),
            index_path: "models/voice.index".to_string(),
            pitch_shift: "same_octave".to_string(),
            use_preview: false,
        })
        .await
        .unwrap();
    assert_eq!(job.status, ConversionStatus::Queued);

    p.conversion_processor().poll_once().await;
    let message = p.transport.messages("voice-conversion").await.remove(0);

    let callbacks = p.callback_service();
    let callback = ConversionCallback {
        job_id: job.id,
        status: CallbackStatus::Completed,
        output_key: Some(message.output_key.clone()),
        error: None,
        completed_at: None,
    };
    let outcome = callbacks
        .handle(Some(CALLBACK_SECRET), callback.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, CallbackOutcome::Applied(_)));
    assert_eq!(outcome.job().status, ConversionStatus::Completed);

    // The conversion service may deliver its callback more than once.
    let replay = callbacks.handle(Some(CALLBACK_SECRET), callback).await.unwrap();
    assert!(matches!(replay, CallbackOutcome::AlreadyFinal(_)));
    assert_eq!(p.store.deliveries().await.len(), 1);

    p.delivery_processor().poll_once().await;

    let requests = p.sender.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, subscription.url);
    assert_eq!(request.event_type, "conversion.completed");
    assert!(WebhookSigner::verify(WEBHOOK_SECRET, &request.body, &request.signature));

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body["event"], "conversion.completed");
    assert_eq!(body["id"], request.delivery_id.to_string());
    assert_eq!(body["data"]["job_id"], job.id.to_string());
    assert_eq!(body["data"]["output_key"], message.output_key);

    let text = String::from_utf8(request.body.clone()).unwrap();
    assert!(!text.contains("://"));
    assert!(!text.contains("X-Amz-Signature"));
    assert!(!text.contains('?'));
}

#[tokio::test]
async fn test_failed_conversion_notifies_subscriber() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    p.subscribe(input.user_id).await;
    let job = p
        .seed_job(
            &input,
            ConversionStatus::Queued,
            vocalis_entity::conversion::PitchShift::OctaveUp,
            false,
        )
        .await;
    p.conversion_processor().poll_once().await;

    p.callback_service()
        .handle(
            Some(CALLBACK_SECRET),
            ConversionCallback {
                job_id: job.id,
                status: CallbackStatus::Failed,
                output_key: None,
                error: Some("model weights unreadable".to_string()),
                completed_at: None,
            },
        )
        .await
        .unwrap();

    let stored = p.job(job.id).await;
    assert_eq!(stored.status, ConversionStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("model weights unreadable"));

    p.delivery_processor().poll_once().await;
    let requests = p.sender.requests().await;
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["event"], "conversion.failed");
    assert_eq!(body["data"]["error"], "model weights unreadable");
}

#[tokio::test]
async fn test_callback_with_wrong_secret_changes_nothing() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(
            &input,
            ConversionStatus::Queued,
            vocalis_entity::conversion::PitchShift::SameOctave,
            false,
        )
        .await;
    p.conversion_processor().poll_once().await;

    let err = p
        .callback_service()
        .handle(
            Some("not-the-secret"),
            ConversionCallback {
                job_id: job.id,
                status: CallbackStatus::Completed,
                output_key: Some("conversions/x.wav".to_string()),
                error: None,
                completed_at: None,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, vocalis_core::error::ErrorKind::Authentication);
    assert_eq!(p.job(job.id).await.status, ConversionStatus::Processing);
}

#[tokio::test]
async fn test_signed_url_in_callback_never_reaches_subscriber() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    p.subscribe(input.user_id).await;
    let job = p
        .seed_job(
            &input,
            ConversionStatus::Queued,
            vocalis_entity::conversion::PitchShift::SameOctave,
            false,
        )
        .await;
    p.conversion_processor().poll_once().await;
    let message = p.transport.messages("voice-conversion").await.remove(0);

    let callback = ConversionCallback {
        job_id: job.id,
        status: CallbackStatus::Completed,
        output_key: Some(
            "https://bucket.s3.amazonaws.com/out.wav?X-Amz-Signature=abc&X-Amz-Expires=900"
                .to_string(),
        ),
        error: None,
        completed_at: None,
    };
    let outcome = p
        .callback_service()
        .handle(Some(CALLBACK_SECRET), callback)
        .await
        .unwrap();
    assert_eq!(outcome.job().output_key.as_deref(), Some(message.output_key.as_str()));

    p.delivery_processor().poll_once().await;
    let requests = p.sender.requests().await;
    assert_eq!(requests.len(), 1);
    let text = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(!text.contains("://"));
    assert!(!text.contains("X-Amz-Signature"));

    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["data"]["output_key"], message.output_key);
}

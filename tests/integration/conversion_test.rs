//! Conversion processor behavior across poll cycles.

use chrono::Duration;

use vocalis_core::traits::Clock;
use vocalis_entity::audio::PreprocessingStatus;
use vocalis_entity::conversion::{ConversionStatus, PitchShift};
use vocalis_gateway::ConversionMessage;
use vocalis_worker::PollingProcessor;

use crate::helpers::Pipeline;

const MAIN: &str = "voice-conversion";
const ALT: &str = "voice-conversion-alt";
const PREVIEW: &str = "voice-conversion-preview";

#[tokio::test]
async fn test_pending_preprocessing_is_retried_five_times_then_failed() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Pending).await;
    let job = p
        .seed_job(&input, ConversionStatus::PendingPreprocessing, PitchShift::SameOctave, false)
        .await;
    let processor = p.conversion_processor();

    processor.poll_once().await;
    assert_eq!(p.job(job.id).await.retry_count, 1);

    // Polling again before the retry delay has passed changes nothing.
    processor.poll_once().await;
    processor.poll_once().await;
    assert_eq!(p.job(job.id).await.retry_count, 1);

    for expected in 2..=5 {
        p.clock.advance(Duration::minutes(5));
        processor.poll_once().await;
        let job = p.job(job.id).await;
        assert_eq!(job.status, ConversionStatus::PendingPreprocessing);
        assert_eq!(job.retry_count, expected);
    }

    p.clock.advance(Duration::minutes(5));
    let report = processor.poll_once().await;
    assert_eq!(report.failed, 1);

    let job = p.job(job.id).await;
    assert_eq!(job.status, ConversionStatus::Failed);
    assert_eq!(job.retry_count, 5);
    assert_eq!(
        job.error_message.as_deref(),
        Some("Preprocessing did not complete after 5 attempts")
    );
    assert_eq!(job.completed_at, Some(p.clock.now()));
}

#[tokio::test]
async fn test_retry_delay_is_not_undercut() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Pending).await;
    let job = p
        .seed_job(&input, ConversionStatus::PendingPreprocessing, PitchShift::SameOctave, false)
        .await;
    let processor = p.conversion_processor();

    processor.poll_once().await;
    p.clock.advance(Duration::minutes(5) - Duration::seconds(1));
    processor.poll_once().await;
    assert_eq!(p.job(job.id).await.retry_count, 1);

    p.clock.advance(Duration::seconds(1));
    processor.poll_once().await;
    assert_eq!(p.job(job.id).await.retry_count, 2);
}

#[tokio::test]
async fn test_same_octave_job_reaches_main_queue() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(&input, ConversionStatus::Queued, PitchShift::SameOctave, false)
        .await;

    let report = p.conversion_processor().poll_once().await;
    assert_eq!(report.advanced, 1);

    let stored = p.job(job.id).await;
    assert_eq!(stored.status, ConversionStatus::Processing);
    assert_eq!(stored.processing_started_at, Some(p.clock.now()));

    let messages = p.transport.messages(MAIN).await;
    assert_eq!(
        messages,
        vec![ConversionMessage {
            job_id: job.id.to_string(),
            model_path: "models/voice.pth".to_string(),
            index_path: "models/voice.index".to_string(),
            pitch_shift: 0,
            input_key: "preprocessed/input.wav".to_string(),
            output_key: format!("conversions/{}/{}.wav", job.user_id, job.id),
            callback: None,
        }]
    );
    assert!(p.transport.messages(ALT).await.is_empty());
    assert!(p.transport.messages(PREVIEW).await.is_empty());
}

#[tokio::test]
async fn test_transposed_jobs_use_alt_queue_even_for_previews() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    p.seed_job(&input, ConversionStatus::Queued, PitchShift::FifthUp, true)
        .await;
    p.seed_job(&input, ConversionStatus::Queued, PitchShift::OctaveDown, false)
        .await;

    p.conversion_processor().poll_once().await;

    let alt = p.transport.messages(ALT).await;
    let mut shifts: Vec<i32> = alt.iter().map(|m| m.pitch_shift).collect();
    shifts.sort_unstable();
    assert_eq!(shifts, vec![-12, 7]);
    assert!(alt.iter().any(|m| m.input_key == "preprocessed/input-preview.wav"));
    assert!(p.transport.messages(PREVIEW).await.is_empty());
    assert!(p.transport.messages(MAIN).await.is_empty());
}

#[tokio::test]
async fn test_untransposed_preview_uses_preview_queue() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    p.seed_job(&input, ConversionStatus::Queued, PitchShift::SameOctave, true)
        .await;

    p.conversion_processor().poll_once().await;

    let preview = p.transport.messages(PREVIEW).await;
    assert_eq!(preview.len(), 1);
    assert_eq!(preview[0].input_key, "preprocessed/input-preview.wav");
}

#[tokio::test]
async fn test_queue_payloads_carry_keys_not_urls() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    p.seed_job(&input, ConversionStatus::Queued, PitchShift::SameOctave, false)
        .await;
    p.seed_job(&input, ConversionStatus::Queued, PitchShift::FourthDown, true)
        .await;

    p.conversion_processor().poll_once().await;

    for queue in [MAIN, ALT, PREVIEW] {
        for body in p.transport.bodies(queue).await {
            assert!(!body.contains("://"), "{body}");
            assert!(!body.contains("X-Amz-Signature"), "{body}");
            assert!(!body.contains('?'), "{body}");
        }
    }
}

#[tokio::test]
async fn test_dispatch_failures_exhaust_retries() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(&input, ConversionStatus::Queued, PitchShift::SameOctave, false)
        .await;
    let processor = p.conversion_processor();
    p.transport.fail_next_publishes(usize::MAX);

    for expected in 1..=5 {
        processor.poll_once().await;
        let stored = p.job(job.id).await;
        assert_eq!(stored.status, ConversionStatus::Queued);
        assert_eq!(stored.retry_count, expected);
        p.clock.advance(Duration::minutes(5));
    }

    processor.poll_once().await;
    let stored = p.job(job.id).await;
    assert_eq!(stored.status, ConversionStatus::Failed);
    assert!(p.transport.messages(MAIN).await.is_empty());
}

#[tokio::test]
async fn test_claim_abandoned_before_publish_is_dispatched_once() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(&input, ConversionStatus::Queued, PitchShift::SameOctave, false)
        .await;
    p.claim_without_publish(&job).await;
    let processor = p.conversion_processor();

    // Inside the stuck threshold the claim is left alone.
    p.clock.advance(Duration::minutes(10));
    processor.poll_once().await;
    assert_eq!(p.job(job.id).await.status, ConversionStatus::Processing);
    assert!(p.transport.messages(MAIN).await.is_empty());

    p.clock.advance(Duration::days(1));
    for _ in 0..10 {
        processor.poll_once().await;
        p.clock.advance(Duration::minutes(1));
    }

    let job = p.job(job.id).await;
    assert_eq!(job.status, ConversionStatus::Processing);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.processing_started_at, Some(p.clock.now() - Duration::minutes(5)));
    assert_eq!(p.transport.messages(MAIN).await.len(), 1);
}

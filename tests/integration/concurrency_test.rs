//! Several processor instances working the same rows.

use std::sync::Arc;

use tokio::task::JoinSet;

use vocalis_core::traits::Clock;
use vocalis_database::store::ConversionJobStore;
use vocalis_entity::audio::PreprocessingStatus;
use vocalis_entity::conversion::{ConversionStatus, PitchShift};
use vocalis_entity::webhook::DeliveryStatus;
use vocalis_worker::{ProcessError, RowOutcome};

use crate::helpers::Pipeline;

const INSTANCES: usize = 8;

#[tokio::test]
async fn test_same_version_writes_only_one_wins() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(&input, ConversionStatus::PendingPreprocessing, PitchShift::SameOctave, false)
        .await;

    // Both instances read the row at the same version.
    let mut first = p.job(job.id).await;
    let mut second = p.job(job.id).await;
    let read_version = first.version;
    assert_eq!(second.version, read_version);

    first.mark_queued(p.clock.now());
    second.record_retry(p.clock.now());

    let winner = ConversionJobStore::update(&p.store, &first, read_version).await;
    let loser = ConversionJobStore::update(&p.store, &second, read_version).await;

    assert!(winner.is_ok());
    assert!(loser.unwrap_err().is_version_conflict());

    let stored = p.job(job.id).await;
    assert_eq!(stored.status, ConversionStatus::Queued);
    assert_eq!(stored.retry_count, 0);
    assert_eq!(stored.version, read_version + 1);
}

#[tokio::test]
async fn test_racing_instances_advance_pending_job_once() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(&input, ConversionStatus::PendingPreprocessing, PitchShift::SameOctave, false)
        .await;

    let mut tasks = JoinSet::new();
    for _ in 0..INSTANCES {
        let processor = Arc::new(p.conversion_processor());
        tasks.spawn(async move { processor.process_pending(job.id).await });
    }

    let mut advanced = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(RowOutcome::Advanced) => advanced += 1,
            Ok(RowOutcome::Skipped) => {}
            Err(ProcessError::Store(e)) if e.is_version_conflict() => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(advanced, 1);

    let stored = p.job(job.id).await;
    assert_eq!(stored.status, ConversionStatus::Queued);
    assert_eq!(stored.retry_count, 0);
}

#[tokio::test]
async fn test_racing_instances_publish_queued_job_once() {
    let p = Pipeline::new();
    let input = p.seed_input(PreprocessingStatus::Completed).await;
    let job = p
        .seed_job(&input, ConversionStatus::Queued, PitchShift::FourthUp, false)
        .await;

    let mut tasks = JoinSet::new();
    for _ in 0..INSTANCES {
        let processor = Arc::new(p.conversion_processor());
        tasks.spawn(async move { processor.dispatch_queued(job.id).await });
    }

    let mut advanced = 0;
    while let Some(result) = tasks.join_next().await {
        if let Ok(RowOutcome::Advanced) = result.unwrap() {
            advanced += 1;
        }
    }
    assert_eq!(advanced, 1);
    assert_eq!(p.transport.messages("voice-conversion-alt").await.len(), 1);
    assert_eq!(p.job(job.id).await.status, ConversionStatus::Processing);
}

#[tokio::test]
async fn test_racing_instances_send_a_delivery_once() {
    let p = Pipeline::new();
    let subscription = p.subscribe(uuid::Uuid::new_v4()).await;
    let delivery = p.enqueue_delivery(&subscription).await;

    let mut tasks = JoinSet::new();
    for _ in 0..INSTANCES {
        let processor = Arc::new(p.delivery_processor());
        tasks.spawn(async move { processor.process(delivery.id).await });
    }
    while tasks.join_next().await.is_some() {}

    assert_eq!(p.sender.send_count().await, 1);
    let stored = p.delivery(delivery.id).await;
    assert_eq!(stored.status, DeliveryStatus::Delivered);
    assert_eq!(stored.attempt_count, 1);
}

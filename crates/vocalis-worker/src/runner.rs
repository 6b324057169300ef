//! Polling loop shared by the background processors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::ProcessError;

/// Shortest accepted poll period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What happened to one candidate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    /// Moved forward in its lifecycle.
    Advanced,
    /// Left in place with its retry state bumped.
    Retried,
    /// Moved to a terminal failure.
    Failed,
    /// Not eligible when re-read; nothing written.
    Skipped,
}

/// Result of processing one row.
pub type RowResult = Result<RowOutcome, ProcessError>;

/// Tally of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Rows looked at.
    pub examined: usize,
    /// Rows advanced.
    pub advanced: usize,
    /// Rows scheduled for another attempt.
    pub retried: usize,
    /// Rows failed terminally.
    pub failed: usize,
    /// Rows skipped on re-read.
    pub skipped: usize,
    /// Rows another instance changed first.
    pub conflicts: usize,
    /// Rows or queries that errored.
    pub errors: usize,
}

impl CycleReport {
    /// Count one row result.
    pub fn record(&mut self, result: &RowResult) {
        self.examined += 1;
        match result {
            Ok(RowOutcome::Advanced) => self.advanced += 1,
            Ok(RowOutcome::Retried) => self.retried += 1,
            Ok(RowOutcome::Failed) => self.failed += 1,
            Ok(RowOutcome::Skipped) => self.skipped += 1,
            Err(e) if e.is_version_conflict() => self.conflicts += 1,
            Err(_) => self.errors += 1,
        }
    }

    /// Whether the cycle found nothing to do.
    pub fn is_idle(&self) -> bool {
        self.examined == 0 && self.errors == 0
    }
}

/// A processor driven by [`PollingLoop`].
#[async_trait]
pub trait PollingProcessor: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Time between cycle starts.
    fn poll_interval(&self) -> Duration;

    /// Run one cycle. Per-row failures are counted, never propagated.
    async fn poll_once(&self) -> CycleReport;
}

/// Runs a processor on a fixed interval until cancelled.
///
/// Cancellation is only observed between cycles: a cycle that has started
/// always runs to completion, and no cycle starts after the signal.
#[derive(Clone)]
pub struct PollingLoop {
    processor: Arc<dyn PollingProcessor>,
}

impl std::fmt::Debug for PollingLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingLoop")
            .field("processor", &self.processor.name())
            .finish()
    }
}

impl PollingLoop {
    /// Create a loop over `processor`.
    pub fn new(processor: Arc<dyn PollingProcessor>) -> Self {
        Self { processor }
    }

    /// Poll until `cancel` turns `true` or its sender is dropped.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        let name = self.processor.name();
        let period = self.processor.poll_interval().max(MIN_POLL_INTERVAL);
        info!(
            processor = name,
            poll_interval_ms = period.as_millis() as u64,
            "Processor started"
        );

        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *cancel.borrow() {
                break;
            }
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let report = self.processor.poll_once().await;
            if !report.is_idle() {
                debug!(
                    processor = name,
                    examined = report.examined,
                    advanced = report.advanced,
                    retried = report.retried,
                    failed = report.failed,
                    skipped = report.skipped,
                    conflicts = report.conflicts,
                    errors = report.errors,
                    "Poll cycle finished"
                );
            }
        }

        info!(processor = name, "Processor stopped");
    }

    /// Run on a new task.
    pub fn spawn(self, cancel: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

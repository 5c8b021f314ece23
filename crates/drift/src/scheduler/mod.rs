//! Poll scheduler.
//!
//! Drives one collection cycle per poll interval:
//!
//! ```text
//! Idle -> Fetching -> Draining -> Flushing -> Checkpointing -> Sleeping -> Fetching ...
//! ```
//!
//! The fetch path runs on the scheduler task and pushes into a bounded spool
//! buffer; a spawned drain task owns the [`BatchWriter`] for the cycle, pops
//! records and appends them to the live unit, then hands the writer back. The
//! checkpoint only moves after the sink has accepted the unit (or after a
//! cycle with nothing to flush). Any failure resets the live unit and leaves
//! the checkpoint where it was.

mod window;

pub use window::{Clock, ManualClock, PollWindow, SystemClock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use snafu::prelude::*;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drift_core::emit;
use drift_core::polling::{IterationResult, PollingProcessor, run_polling_loop};

use crate::category::Category;
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{
    CheckpointError, CheckpointSnafu, CollectorError, DrainTaskSnafu, FetchSnafu,
    RecordCountMismatchSnafu, SinkSnafu, SpoolError, SpoolSnafu,
};
use crate::fetch::RecordFetcher;
use crate::metrics::events::{
    CycleAborted, RecordsFetched, RecordsWritten, SpoolDiscardFailed, WatermarkLag,
};
use crate::sink::Sink;
use crate::spool::{BatchWriter, SPOOL_CAPACITY, SpoolConsumer, SpoolProducer, spool_buffer};

/// Where the scheduler is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Draining,
    Flushing,
    Checkpointing,
    Sleeping,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Fetching => "fetching",
            CyclePhase::Draining => "draining",
            CyclePhase::Flushing => "flushing",
            CyclePhase::Checkpointing => "checkpointing",
            CyclePhase::Sleeping => "sleeping",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub window: PollWindow,
    /// Non-zero per-category counts, in collection order.
    pub per_category: Vec<(Category, usize)>,
    pub records: usize,
    /// Whether a unit was handed to the sink.
    pub flushed: bool,
}

/// The collector: a [`PollingProcessor`] running one cycle per iteration.
pub struct Collector<F, S, C = SystemClock> {
    name: String,
    fetcher: F,
    sink: S,
    clock: C,
    checkpoints: CheckpointStore,
    /// Checked out to the drain task while a cycle is running.
    writer: Option<BatchWriter>,
    watermark: Option<DateTime<Utc>>,
    phase: CyclePhase,
    buffer_capacity: usize,
}

impl<F, S> Collector<F, S, SystemClock>
where
    F: RecordFetcher,
    S: Sink,
{
    pub fn new(
        name: impl Into<String>,
        fetcher: F,
        sink: S,
        checkpoints: CheckpointStore,
        writer: BatchWriter,
    ) -> Self {
        Self::with_clock(name, fetcher, sink, checkpoints, writer, SystemClock)
    }
}

impl<F, S, C> Collector<F, S, C>
where
    F: RecordFetcher,
    S: Sink,
    C: Clock,
{
    pub fn with_clock(
        name: impl Into<String>,
        fetcher: F,
        sink: S,
        checkpoints: CheckpointStore,
        writer: BatchWriter,
        clock: C,
    ) -> Self {
        Self {
            name: name.into(),
            fetcher,
            sink,
            clock,
            checkpoints,
            writer: Some(writer),
            watermark: None,
            phase: CyclePhase::Idle,
            buffer_capacity: SPOOL_CAPACITY,
        }
    }

    /// Override the spool buffer capacity.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Watermark of the last loaded or saved checkpoint.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Run cycles until `shutdown` fires or a cycle fails.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        poll_jitter_secs: u64,
        shutdown: CancellationToken,
    ) -> Result<(), CollectorError> {
        let name = self.name.clone();
        info!(
            target = %name,
            poll_interval_secs = poll_interval.as_secs(),
            poll_jitter_secs,
            checkpoint = %self.checkpoints.location(),
            "Starting collector"
        );
        run_polling_loop(self, poll_interval, poll_jitter_secs, shutdown, &name).await
    }

    /// Load the checkpoint, or start from now when none exists.
    pub async fn restore(&mut self) -> Result<DateTime<Utc>, CollectorError> {
        let watermark = match self.checkpoints.load().await {
            Ok(checkpoint) => checkpoint.last_poll_timestamp,
            Err(CheckpointError::NotFound { .. }) => {
                let now = crate::watermark::truncate_to_second(self.clock.now());
                info!(
                    target = %self.name,
                    watermark = %crate::watermark::format_watermark(now),
                    "No checkpoint found, starting from now"
                );
                now
            }
            Err(e) => return Err(e).context(CheckpointSnafu),
        };
        self.watermark = Some(watermark);
        Ok(watermark)
    }

    /// Cut the next poll window from the current watermark.
    pub async fn next_window(&mut self) -> Result<PollWindow, CollectorError> {
        let start = match self.watermark {
            Some(watermark) => watermark,
            None => self.restore().await?,
        };
        Ok(PollWindow::ending_now(start, &self.clock))
    }

    /// Run one cycle over `window`.
    ///
    /// On error the live unit is reset and the checkpoint is left untouched.
    pub async fn run_cycle(&mut self, window: PollWindow) -> Result<CycleReport, CollectorError> {
        let Some(writer) = self.writer.take() else {
            return Err(SpoolError::WriterUnavailable).context(SpoolSnafu);
        };

        debug!(
            target = %self.name,
            start = %crate::watermark::format_watermark(window.start),
            end = %window.watermark(),
            "Starting cycle"
        );

        let (producer, consumer) = spool_buffer(self.buffer_capacity);
        let drain_task = tokio::spawn(drain(consumer, writer, self.name.clone()));

        self.transition(CyclePhase::Fetching);
        let fetched = self.fetch_all(window, producer).await;

        self.transition(CyclePhase::Draining);
        let (mut writer, written) = drain_task.await.context(DrainTaskSnafu)?;

        let result = self.complete_cycle(&mut writer, window, fetched, written).await;

        if let Err(e) = &result {
            emit!(CycleAborted {
                stage: self.phase.as_str(),
                target: self.name.clone(),
            });
            warn!(
                target = %self.name,
                phase = %self.phase,
                error = %e,
                "Cycle aborted, checkpoint unchanged"
            );
            if let Err(reset_err) = writer.reset().await {
                warn!(target = %self.name, error = %reset_err, "Failed to reset live spool unit");
            }
            self.transition(CyclePhase::Idle);
        }

        self.writer = Some(writer);
        result
    }

    /// Stream every category into the spool buffer, in order.
    ///
    /// Dropping `producer` on return closes the buffer so the drain finishes.
    async fn fetch_all(
        &self,
        window: PollWindow,
        producer: SpoolProducer,
    ) -> Result<Vec<(Category, usize)>, CollectorError> {
        let mut counts = Vec::with_capacity(Category::ALL.len());

        for category in Category::ALL {
            let mut records = self.fetcher.fetch(category, window);
            let mut count = 0;

            while let Some(record) = records.try_next().await.context(FetchSnafu)? {
                producer.push(record).await.context(SpoolSnafu)?;
                count += 1;
            }

            emit!(RecordsFetched {
                category,
                count,
                target: self.name.clone(),
            });
            debug!(target = %self.name, category = %category, records = count, "Fetched category");
            counts.push((category, count));
        }

        Ok(counts)
    }

    async fn complete_cycle(
        &mut self,
        writer: &mut BatchWriter,
        window: PollWindow,
        fetched: Result<Vec<(Category, usize)>, CollectorError>,
        written: Result<usize, SpoolError>,
    ) -> Result<CycleReport, CollectorError> {
        // A failed write closes the buffer under the fetcher, so it is the
        // root cause whenever both sides report an error.
        let (counts, records) = match (fetched, written) {
            (_, Err(e)) => return Err(e).context(SpoolSnafu),
            (Err(e), Ok(_)) => return Err(e),
            (Ok(counts), Ok(written)) => {
                let fetched: usize = counts.iter().map(|(_, count)| count).sum();
                ensure!(
                    fetched == written,
                    RecordCountMismatchSnafu { fetched, written }
                );
                (counts, fetched)
            }
        };

        self.transition(CyclePhase::Flushing);
        let watermark = window.watermark();
        let flushed = if records == 0 {
            debug!(target = %self.name, "No records this cycle, skipping flush");
            false
        } else {
            match writer.rotate().await.context(SpoolSnafu)? {
                Some(unit) => {
                    self.sink.flush(&unit, &watermark).await.context(SinkSnafu)?;
                    let path = unit.path().to_path_buf();
                    if let Err(e) = writer.discard(unit).await {
                        emit!(SpoolDiscardFailed {
                            target: self.name.clone(),
                        });
                        warn!(
                            target = %self.name,
                            path = %path.display(),
                            error = %e,
                            "Failed to delete flushed spool unit"
                        );
                    }
                    true
                }
                None => false,
            }
        };

        self.transition(CyclePhase::Checkpointing);
        let checkpoint = Checkpoint::for_cycle(window.end, records as u64, self.clock.now());
        self.checkpoints
            .save(&checkpoint)
            .await
            .context(CheckpointSnafu)?;
        self.watermark = Some(window.end);

        emit!(WatermarkLag {
            seconds: (self.clock.now() - window.end).num_seconds(),
            target: self.name.clone(),
        });

        let per_category: Vec<(Category, usize)> =
            counts.into_iter().filter(|(_, count)| *count > 0).collect();
        info!(
            target = %self.name,
            watermark = %watermark,
            records,
            categories = ?per_category,
            flushed,
            "Cycle complete"
        );

        self.transition(CyclePhase::Sleeping);
        Ok(CycleReport {
            window,
            per_category,
            records,
            flushed,
        })
    }

    fn transition(&mut self, next: CyclePhase) {
        debug!(target = %self.name, from = %self.phase, to = %next, "Phase transition");
        self.phase = next;
    }
}

/// Pop every record and append it to the live unit, then hand the writer back.
///
/// Returns early on a write error; dropping the consumer makes the next push
/// on the fetch side fail.
async fn drain(
    mut consumer: SpoolConsumer,
    mut writer: BatchWriter,
    target: String,
) -> (BatchWriter, Result<usize, SpoolError>) {
    let mut written = 0;

    while let Some(record) = consumer.pop().await {
        if let Err(e) = writer.write_record(&record).await {
            return (writer, Err(e));
        }
        written += 1;
    }

    emit!(RecordsWritten {
        count: written,
        target,
    });
    (writer, Ok(written))
}

#[async_trait]
impl<F, S, C> PollingProcessor for Collector<F, S, C>
where
    F: RecordFetcher,
    S: Sink,
    C: Clock,
{
    type State = PollWindow;
    type Error = CollectorError;

    async fn prepare(&mut self, cold_start: bool) -> Result<Option<PollWindow>, CollectorError> {
        if cold_start {
            self.restore().await?;
        }
        Ok(Some(self.next_window().await?))
    }

    async fn process(&mut self, window: PollWindow) -> Result<IterationResult, CollectorError> {
        let report = self.run_cycle(window).await?;
        Ok(if report.records > 0 {
            IterationResult::ProcessedItems
        } else {
            IterationResult::NoItems
        })
    }
}

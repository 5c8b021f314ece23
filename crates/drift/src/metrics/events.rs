//! Collector-specific internal events.

use drift_core::metrics::events::InternalEvent;
use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use crate::category::Category;

/// Records streamed from one category during a cycle.
pub struct RecordsFetched {
    pub category: Category,
    pub count: usize,
    pub target: String,
}

impl InternalEvent for RecordsFetched {
    fn emit(self) {
        trace!(
            category = %self.category,
            count = self.count,
            target = %self.target,
            "Records fetched"
        );
        counter!(
            "drift_records_fetched_total",
            "category" => self.category.as_str(),
            "target" => self.target
        )
        .increment(self.count as u64);
    }
}

/// One upstream page round trip.
pub struct PageFetched {
    pub category: Category,
    pub records: usize,
}

impl InternalEvent for PageFetched {
    fn emit(self) {
        trace!(category = %self.category, records = self.records, "Page fetched");
        counter!("drift_pages_fetched_total", "category" => self.category.as_str()).increment(1);
    }
}

/// Records appended to the live spool unit.
pub struct RecordsWritten {
    pub count: usize,
    pub target: String,
}

impl InternalEvent for RecordsWritten {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records written");
        counter!("drift_records_written_total", "target" => self.target)
            .increment(self.count as u64);
    }
}

/// A sealed unit accepted by the sink.
pub struct BatchFlushed {
    pub records: usize,
    pub bytes: u64,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for BatchFlushed {
    fn emit(self) {
        trace!(
            records = self.records,
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            target = %self.target,
            "Batch flushed"
        );
        counter!("drift_batches_flushed_total", "target" => self.target.clone()).increment(1);
        counter!("drift_batch_bytes_total", "target" => self.target.clone()).increment(self.bytes);
        histogram!("drift_batch_flush_duration_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// Checkpoint persisted.
pub struct CheckpointSaved {
    pub target: String,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(target = %self.target, "Checkpoint saved");
        counter!("drift_checkpoint_saves_total", "target" => self.target).increment(1);
    }
}

/// Distance between the persisted watermark and the wall clock.
pub struct WatermarkLag {
    pub seconds: i64,
    pub target: String,
}

impl InternalEvent for WatermarkLag {
    fn emit(self) {
        trace!(seconds = self.seconds, target = %self.target, "Watermark lag");
        gauge!("drift_watermark_lag_seconds", "target" => self.target).set(self.seconds as f64);
    }
}

/// A flushed unit could not be removed from the spool directory.
pub struct SpoolDiscardFailed {
    pub target: String,
}

impl InternalEvent for SpoolDiscardFailed {
    fn emit(self) {
        trace!(target = %self.target, "Spool discard failed");
        counter!("drift_spool_discard_failures_total", "target" => self.target).increment(1);
    }
}

/// A cycle aborted before checkpointing.
pub struct CycleAborted {
    pub stage: &'static str,
    pub target: String,
}

impl InternalEvent for CycleAborted {
    fn emit(self) {
        trace!(stage = self.stage, target = %self.target, "Cycle aborted");
        counter!(
            "drift_cycles_aborted_total",
            "stage" => self.stage,
            "target" => self.target
        )
        .increment(1);
    }
}

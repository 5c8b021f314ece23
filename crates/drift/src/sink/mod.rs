//! Batch hand-off.
//!
//! A sink receives a sealed unit together with the watermark of the window
//! it covers. Returning `Ok` transfers responsibility for the records; the
//! caller then deletes its local copy and advances the checkpoint.

mod storage;

pub use storage::{StorageSink, object_name};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SinkError;
use crate::spool::SealedUnit;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Durably accept `unit`. `watermark` is the RFC-3339 window end.
    async fn flush(&self, unit: &SealedUnit, watermark: &str) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn flush(&self, unit: &SealedUnit, watermark: &str) -> Result<(), SinkError> {
        (**self).flush(unit, watermark).await
    }
}

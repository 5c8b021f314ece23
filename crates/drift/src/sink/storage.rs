//! Object storage sink.
//!
//! Uploads each sealed unit to
//! `{uri}/date=YYYY-MM-DD/{collector}-{YYYYMMDDTHHMMSSZ}.ndjson`, with date
//! and stamp taken from the watermark. Delivery is at-least-once: a crash
//! after upload but before the checkpoint is saved re-fetches the window with
//! a later end, so the same records land again under a new object name.

use bytes::Bytes;
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use drift_core::emit;
use drift_core::storage::{StorageProvider, StorageProviderRef};

use super::Sink;
use crate::error::{InvalidWatermarkSnafu, ReadUnitSnafu, SinkError, SinkSetupSnafu, UploadSnafu};
use crate::metrics::events::BatchFlushed;
use crate::spool::SealedUnit;
use crate::watermark::parse_watermark;

/// Object name for a unit flushed at `watermark`.
pub fn object_name(collector: &str, watermark: &str) -> Result<String, SinkError> {
    let ts = parse_watermark(watermark).context(InvalidWatermarkSnafu { watermark })?;
    Ok(format!(
        "date={}/{collector}-{}.ndjson",
        ts.format("%Y-%m-%d"),
        ts.format("%Y%m%dT%H%M%SZ")
    ))
}

/// Sink writing sealed units to a [`StorageProvider`].
#[derive(Debug, Clone)]
pub struct StorageSink {
    storage: StorageProviderRef,
    collector: String,
}

impl StorageSink {
    /// Open a sink rooted at `uri`.
    pub async fn open(
        uri: &str,
        storage_options: HashMap<String, String>,
        collector: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let collector = collector.into();
        debug!(target = %collector, uri = %uri, "Opening storage sink");

        let storage = StorageProvider::for_url_with_options(uri, storage_options)
            .await
            .context(SinkSetupSnafu)?;

        Ok(Self::new(Arc::new(storage), collector))
    }

    pub fn new(storage: StorageProviderRef, collector: impl Into<String>) -> Self {
        Self {
            storage,
            collector: collector.into(),
        }
    }
}

#[async_trait::async_trait]
impl Sink for StorageSink {
    async fn flush(&self, unit: &SealedUnit, watermark: &str) -> Result<(), SinkError> {
        let start = Instant::now();
        let name = object_name(&self.collector, watermark)?;

        let bytes = tokio::fs::read(unit.path())
            .await
            .context(ReadUnitSnafu { path: unit.path() })?;

        self.storage
            .put_payload(&Path::from(name.as_str()), PutPayload::from(Bytes::from(bytes)))
            .await
            .context(UploadSnafu {
                destination: format!("{}/{name}", self.storage.canonical_url()),
            })?;

        emit!(BatchFlushed {
            records: unit.records(),
            bytes: unit.bytes(),
            duration: start.elapsed(),
            target: self.collector.clone(),
        });
        info!(
            target = %self.collector,
            path = %name,
            records = unit.records(),
            bytes = unit.bytes(),
            watermark = %watermark,
            "Flushed batch to storage"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Record;
    use crate::spool::BatchWriter;
    use tempfile::TempDir;

    #[test]
    fn test_object_name_from_watermark() {
        assert_eq!(
            object_name("gsuite", "2024-01-01T00:05:00Z").unwrap(),
            "date=2024-01-01/gsuite-20240101T000500Z.ndjson"
        );
    }

    #[test]
    fn test_object_name_rejects_bad_watermark() {
        let err = object_name("gsuite", "not-a-time").unwrap_err();
        assert!(matches!(err, SinkError::InvalidWatermark { .. }));
    }

    #[tokio::test]
    async fn test_flush_uploads_unit_bytes() {
        let spool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();

        let mut writer = BatchWriter::open(spool_dir.path(), "gsuite").await.unwrap();
        writer.write_record(&Record::from(r#"{"id":1}"#)).await.unwrap();
        let unit = writer.rotate().await.unwrap().unwrap();

        let sink = StorageSink::open(out_dir.path().to_str().unwrap(), HashMap::new(), "gsuite")
            .await
            .unwrap();
        sink.flush(&unit, "2024-01-01T00:05:00Z").await.unwrap();

        let uploaded = out_dir
            .path()
            .join("date=2024-01-01/gsuite-20240101T000500Z.ndjson");
        assert_eq!(std::fs::read_to_string(uploaded).unwrap(), "{\"id\":1}\n");
        // The sink does not own local cleanup.
        assert!(unit.path().exists());
    }

    #[tokio::test]
    async fn test_flush_missing_unit_is_error() {
        let spool_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();

        let mut writer = BatchWriter::open(spool_dir.path(), "gsuite").await.unwrap();
        writer.write_record(&Record::from("x")).await.unwrap();
        let unit = writer.rotate().await.unwrap().unwrap();
        std::fs::remove_file(unit.path()).unwrap();

        let sink = StorageSink::open(out_dir.path().to_str().unwrap(), HashMap::new(), "gsuite")
            .await
            .unwrap();
        let err = sink.flush(&unit, "2024-01-01T00:05:00Z").await.unwrap_err();
        assert!(matches!(err, SinkError::ReadUnit { .. }));
    }
}

//! On-disk batch unit.
//!
//! Records are appended, newline-terminated, to a single live file
//! `{collector}.live.ndjson` in the spool directory. Rotation syncs the file
//! and renames it to `{collector}-{stamp}-{uuid}.sealed.ndjson`; the sealed
//! file then belongs to whoever receives the [`SealedUnit`] until it is
//! discarded.

use chrono::Utc;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::error::{SpoolError, SpoolIoSnafu};
use crate::fetch::Record;

const LIVE_SUFFIX: &str = ".live.ndjson";
const SEALED_SUFFIX: &str = ".sealed.ndjson";

/// A rotated unit waiting for hand-off.
#[derive(Debug, PartialEq, Eq)]
pub struct SealedUnit {
    path: PathBuf,
    records: usize,
    bytes: u64,
}

impl SealedUnit {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Appends records to the live unit and seals it on rotation.
#[derive(Debug)]
pub struct BatchWriter {
    dir: PathBuf,
    collector: String,
    live_path: PathBuf,
    file: BufWriter<File>,
    records: usize,
    bytes: u64,
}

impl BatchWriter {
    /// Open the spool directory for `collector`.
    ///
    /// Sealed units left behind by an earlier process are removed; their
    /// window was never checkpointed and will be fetched again. The live unit
    /// starts empty.
    pub async fn open(dir: impl Into<PathBuf>, collector: &str) -> Result<Self, SpoolError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .context(SpoolIoSnafu { path: dir.clone() })?;

        remove_stale_units(&dir, collector).await?;

        let live_path = dir.join(format!("{collector}{LIVE_SUFFIX}"));
        let file = create_file(&live_path).await?;

        Ok(Self {
            dir,
            collector: collector.to_string(),
            live_path,
            file: BufWriter::new(file),
            records: 0,
            bytes: 0,
        })
    }

    /// Append one record as a line.
    pub async fn write_record(&mut self, record: &Record) -> Result<(), SpoolError> {
        let line = record.as_str();
        self.file
            .write_all(line.as_bytes())
            .await
            .context(SpoolIoSnafu {
                path: self.live_path.clone(),
            })?;
        self.file.write_all(b"\n").await.context(SpoolIoSnafu {
            path: self.live_path.clone(),
        })?;

        self.records += 1;
        self.bytes += line.len() as u64 + 1;
        Ok(())
    }

    /// Records in the live unit.
    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Path of the live unit.
    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// Seal the live unit and start a fresh one.
    ///
    /// Returns `None` without touching the filesystem when nothing has been
    /// written since the last rotation.
    pub async fn rotate(&mut self) -> Result<Option<SealedUnit>, SpoolError> {
        if self.records == 0 {
            return Ok(None);
        }

        self.sync().await?;

        let sealed_path = self.dir.join(format!(
            "{}-{}-{}{SEALED_SUFFIX}",
            self.collector,
            Utc::now().format("%Y%m%dT%H%M%SZ"),
            uuid::Uuid::new_v4().simple()
        ));
        fs::rename(&self.live_path, &sealed_path)
            .await
            .context(SpoolIoSnafu {
                path: sealed_path.clone(),
            })?;

        let unit = SealedUnit {
            path: sealed_path,
            records: self.records,
            bytes: self.bytes,
        };

        self.file = BufWriter::new(create_file(&self.live_path).await?);
        self.records = 0;
        self.bytes = 0;

        debug!(
            path = %unit.path.display(),
            records = unit.records,
            bytes = unit.bytes,
            "Sealed spool unit"
        );

        Ok(Some(unit))
    }

    /// Delete a sealed unit after the sink has accepted it.
    pub async fn discard(&self, unit: SealedUnit) -> Result<(), SpoolError> {
        fs::remove_file(&unit.path)
            .await
            .context(SpoolIoSnafu { path: unit.path })
    }

    /// Drop everything written to the live unit since the last rotation.
    pub async fn reset(&mut self) -> Result<(), SpoolError> {
        self.file = BufWriter::new(create_file(&self.live_path).await?);
        self.records = 0;
        self.bytes = 0;
        Ok(())
    }

    async fn sync(&mut self) -> Result<(), SpoolError> {
        self.file.flush().await.context(SpoolIoSnafu {
            path: self.live_path.clone(),
        })?;
        self.file
            .get_ref()
            .sync_all()
            .await
            .context(SpoolIoSnafu {
                path: self.live_path.clone(),
            })
    }
}

/// Create or truncate `path`.
async fn create_file(path: &Path) -> Result<File, SpoolError> {
    File::create(path).await.context(SpoolIoSnafu {
        path: path.to_path_buf(),
    })
}

async fn remove_stale_units(dir: &Path, collector: &str) -> Result<(), SpoolError> {
    let mut entries = fs::read_dir(dir).await.context(SpoolIoSnafu { path: dir })?;
    let prefix = format!("{collector}-");

    while let Some(entry) = entries
        .next_entry()
        .await
        .context(SpoolIoSnafu { path: dir })?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !(name.starts_with(&prefix) && name.ends_with(SEALED_SUFFIX)) {
            continue;
        }

        let path = entry.path();
        warn!(
            path = %path.display(),
            "Removing sealed spool unit from an earlier run; its window will be fetched again"
        );
        fs::remove_file(&path)
            .await
            .context(SpoolIoSnafu { path: path.clone() })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_lines(writer: &mut BatchWriter, lines: &[&str]) {
        for line in lines {
            writer.write_record(&Record::from(*line)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_rotate_seals_written_records() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = BatchWriter::open(temp_dir.path(), "gsuite").await.unwrap();

        write_lines(&mut writer, &[r#"{"a":1}"#, r#"{"b":2}"#]).await;
        let unit = writer.rotate().await.unwrap().unwrap();

        assert_eq!(unit.records(), 2);
        assert_eq!(unit.bytes(), 16);
        let content = std::fs::read_to_string(unit.path()).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"b\":2}\n");

        // Fresh live unit after rotation.
        assert_eq!(writer.record_count(), 0);
        assert_eq!(std::fs::metadata(writer.live_path()).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_rotate_empty_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = BatchWriter::open(temp_dir.path(), "gsuite").await.unwrap();

        assert!(writer.rotate().await.unwrap().is_none());
        assert!(writer.live_path().exists());
    }

    #[tokio::test]
    async fn test_discard_removes_sealed_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = BatchWriter::open(temp_dir.path(), "gsuite").await.unwrap();

        write_lines(&mut writer, &["x"]).await;
        let unit = writer.rotate().await.unwrap().unwrap();
        let path = unit.path().to_path_buf();

        writer.discard(unit).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_reset_truncates_live_unit() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = BatchWriter::open(temp_dir.path(), "gsuite").await.unwrap();

        write_lines(&mut writer, &["partial-1", "partial-2"]).await;
        writer.reset().await.unwrap();
        assert_eq!(writer.record_count(), 0);
        assert!(writer.rotate().await.unwrap().is_none());

        write_lines(&mut writer, &["kept"]).await;
        let unit = writer.rotate().await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(unit.path()).unwrap(), "kept\n");
    }

    #[tokio::test]
    async fn test_open_removes_stale_sealed_units() {
        let temp_dir = TempDir::new().unwrap();
        let stale = temp_dir.path().join("gsuite-20240101T000000Z-abc.sealed.ndjson");
        let other = temp_dir.path().join("other-20240101T000000Z-abc.sealed.ndjson");
        std::fs::write(&stale, "old\n").unwrap();
        std::fs::write(&other, "old\n").unwrap();
        std::fs::write(temp_dir.path().join("gsuite.live.ndjson"), "half\n").unwrap();

        let writer = BatchWriter::open(temp_dir.path(), "gsuite").await.unwrap();

        assert!(!stale.exists());
        assert!(other.exists());
        assert_eq!(std::fs::metadata(writer.live_path()).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("spool/nested");

        BatchWriter::open(&dir, "gsuite").await.unwrap();
        assert!(dir.join("gsuite.live.ndjson").exists());
    }
}

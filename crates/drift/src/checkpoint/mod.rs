//! Checkpoint persistence.
//!
//! The checkpoint location is a single file addressed by path or storage URL
//! (`/var/lib/drift/state.json`, `gs://bucket/drift/state.json`). It is split
//! into a storage root and an object name; the root is opened through
//! [`StorageProvider`] so local and bucket checkpoints share one code path.
//!
//! # Atomic Writes
//!
//! 1. Write to `{name}.tmp`
//! 2. Rename to `{name}`
//!
//! A reader never observes a partially written checkpoint.

pub mod state;

pub use state::Checkpoint;

use object_store::path::Path;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use drift_core::emit;
use drift_core::storage::{StorageProvider, StorageProviderRef};

use crate::error::{
    CheckpointError, CheckpointStorageSnafu, CorruptSnafu, InvalidLocationSnafu, NotFoundSnafu,
    SerializeCheckpointSnafu,
};
use crate::metrics::events::CheckpointSaved;
use crate::watermark::format_watermark;

/// Loads and saves the collector checkpoint.
#[derive(Debug)]
pub struct CheckpointStore {
    storage: StorageProviderRef,
    file: Path,
    location: String,
    target: String,
}

impl CheckpointStore {
    /// Open the store for a checkpoint location.
    pub async fn open(
        location: &str,
        storage_options: HashMap<String, String>,
        target: impl Into<String>,
    ) -> Result<Self, CheckpointError> {
        let (root, file) = split_location(location)?;
        let storage = StorageProvider::for_url_with_options(root, storage_options)
            .await
            .context(CheckpointStorageSnafu { location })?;

        Ok(Self::new(Arc::new(storage), file, location, target))
    }

    /// Create a store over an existing storage root.
    pub fn new(
        storage: StorageProviderRef,
        file: &str,
        location: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            file: Path::from(file),
            location: location.into(),
            target: target.into(),
        }
    }

    /// Location as configured, for logs.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Load the checkpoint.
    ///
    /// Returns [`CheckpointError::NotFound`] when nothing has been saved yet.
    /// A file that exists but does not decode is [`CheckpointError::Corrupt`].
    pub async fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let location = self.location.as_str();

        let bytes = match self.storage.get(&self.file).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return NotFoundSnafu { location }.fail(),
            Err(e) => return Err(e).context(CheckpointStorageSnafu { location }),
        };

        let checkpoint: Checkpoint =
            serde_json::from_slice(&bytes).context(CorruptSnafu { location })?;

        info!(
            target = %self.target,
            watermark = %format_watermark(checkpoint.last_poll_timestamp),
            "Loaded checkpoint"
        );

        Ok(checkpoint)
    }

    /// Persist the checkpoint with write-then-rename.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(checkpoint).context(SerializeCheckpointSnafu)?;

        self.storage
            .atomic_write(&self.file, json)
            .await
            .context(CheckpointStorageSnafu {
                location: self.location.as_str(),
            })?;

        emit!(CheckpointSaved {
            target: self.target.clone(),
        });

        debug!(
            target = %self.target,
            watermark = %format_watermark(checkpoint.last_poll_timestamp),
            records = checkpoint.records,
            "Saved checkpoint"
        );

        Ok(())
    }
}

/// Split a checkpoint location into a storage root and an object name.
fn split_location(location: &str) -> Result<(&str, &str), CheckpointError> {
    let Some((root, file)) = location.rsplit_once('/') else {
        // Bare file name, relative to the working directory.
        ensure!(!location.is_empty(), InvalidLocationSnafu { location });
        return Ok((".", location));
    };

    // `gs://bucket` has no object name; `dir/` has an empty one.
    ensure!(
        !file.is_empty() && !root.ends_with(':') && !root.ends_with(":/"),
        InvalidLocationSnafu { location }
    );

    let root = match root {
        "" => "/",
        "file://" => "file:///",
        root => root,
    };
    Ok((root, file))
}

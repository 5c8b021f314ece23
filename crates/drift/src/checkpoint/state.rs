//! Persisted collector checkpoint.
//!
//! # Example
//!
//! ```json
//! {
//!   "last_poll_timestamp": "2024-01-01T00:05:00Z",
//!   "updated_at": "2024-01-01T00:05:02Z",
//!   "records": 3
//! }
//! ```
//!
//! Only `last_poll_timestamp` drives the next poll window. `updated_at` and
//! `records` are there for operators reading the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::watermark::serde_watermark;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Exclusive end of the last successfully flushed window.
    #[serde(with = "serde_watermark")]
    pub last_poll_timestamp: DateTime<Utc>,
    /// Wall-clock time of the save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Records collected by the cycle that produced this checkpoint.
    #[serde(default)]
    pub records: u64,
}

impl Checkpoint {
    /// Checkpoint carrying only a watermark.
    pub fn new(last_poll_timestamp: DateTime<Utc>) -> Self {
        Self {
            last_poll_timestamp,
            updated_at: None,
            records: 0,
        }
    }

    /// Checkpoint for a completed cycle.
    pub fn for_cycle(
        last_poll_timestamp: DateTime<Utc>,
        records: u64,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            last_poll_timestamp,
            updated_at: Some(updated_at),
            records,
        }
    }
}

//! Error types for the drift collector.
//!
//! Each component returns its own error enum; `CollectorError` wraps them for
//! the scheduler. Nothing below `main` terminates the process.

use snafu::prelude::*;
use std::path::PathBuf;

use crate::category::Category;

// Re-export common errors
pub use drift_core::error::{ConfigError, MetricsError, StorageError};

/// Errors from the checkpoint store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CheckpointError {
    /// No checkpoint has been written yet.
    #[snafu(display("No checkpoint found at {location}"))]
    NotFound { location: String },

    /// Location cannot be split into a directory and a file name.
    #[snafu(display("Invalid checkpoint location '{location}': expected a file path or object URL"))]
    InvalidLocation { location: String },

    /// Reading or writing the checkpoint failed.
    #[snafu(display("Checkpoint storage error at {location}: {source}"))]
    CheckpointStorage {
        location: String,
        source: StorageError,
    },

    /// A checkpoint exists but cannot be decoded.
    #[snafu(display("Corrupt checkpoint at {location}: {source}"))]
    Corrupt {
        location: String,
        source: serde_json::Error,
    },

    /// Failed to serialize checkpoint state.
    #[snafu(display("Failed to serialize checkpoint: {source}"))]
    SerializeCheckpoint { source: serde_json::Error },
}

/// Errors from fetching upstream records.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The HTTP request could not be sent or the connection failed.
    #[snafu(display("Request for '{category}' failed: {source}"))]
    Request {
        category: Category,
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status.
    #[snafu(display("Upstream returned {status} for '{category}': {body}"))]
    Status {
        category: Category,
        status: u16,
        body: String,
    },

    /// Response body was not the expected JSON.
    #[snafu(display("Failed to decode '{category}' response: {source}"))]
    Decode {
        category: Category,
        source: reqwest::Error,
    },

    /// An activity could not be re-encoded as a single-line record.
    #[snafu(display("Failed to encode '{category}' record: {source}"))]
    Encode {
        category: Category,
        source: serde_json::Error,
    },

    /// Upstream handed back the page token it was just given.
    #[snafu(display("Upstream repeated page token for '{category}', refusing to loop"))]
    RepeatedPageToken { category: Category },

    /// Reading the access token file failed.
    #[snafu(display("Failed to read access token from {}: {source}", path.display()))]
    TokenRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The access token is empty.
    #[snafu(display("Access token is empty"))]
    EmptyToken,

    /// Reading the service-account key file failed.
    #[snafu(display("Failed to read service account key {}: {source}", path.display()))]
    CredentialsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The service-account key file is not valid key JSON.
    #[snafu(display("Invalid service account key {}: {source}", path.display()))]
    CredentialsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The key's `private_key` is not an RSA PEM key.
    #[snafu(display("Invalid private key in {}: {source}", path.display()))]
    SigningKey {
        path: PathBuf,
        source: jsonwebtoken::errors::Error,
    },

    /// Signing the token assertion failed.
    #[snafu(display("Failed to sign token assertion: {source}"))]
    SignAssertion { source: jsonwebtoken::errors::Error },

    /// The token endpoint could not be reached.
    #[snafu(display("Token request failed: {source}"))]
    TokenRequest { source: reqwest::Error },

    /// The token endpoint refused the assertion.
    #[snafu(display("Token endpoint returned {status}: {body}"))]
    TokenExchange { status: u16, body: String },

    /// The token endpoint's response was not the expected JSON.
    #[snafu(display("Failed to decode token response: {source}"))]
    TokenDecode { source: reqwest::Error },

    /// Building the HTTP client failed.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild { source: reqwest::Error },

    /// Any other upstream failure, reported by non-HTTP fetchers.
    #[snafu(display("Fetch of '{category}' failed: {message}"))]
    Upstream { category: Category, message: String },
}

/// Errors from the spool buffer and batch writer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SpoolError {
    /// Filesystem operation on a spool file failed.
    #[snafu(display("Spool I/O error on {}: {source}", path.display()))]
    SpoolIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The consumer side of the buffer is gone.
    #[snafu(display("Spool buffer closed"))]
    BufferClosed,

    /// The batch writer is checked out by a drain that never returned it.
    #[snafu(display("Batch writer unavailable"))]
    WriterUnavailable,
}

/// Errors from handing a sealed unit to the sink.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Reading the sealed unit failed.
    #[snafu(display("Failed to read sealed unit {}: {source}", path.display()))]
    ReadUnit {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Watermark is not an RFC-3339 timestamp.
    #[snafu(display("Invalid watermark '{watermark}': {source}"))]
    InvalidWatermark {
        watermark: String,
        source: chrono::ParseError,
    },

    /// Uploading the unit failed.
    #[snafu(display("Failed to upload batch to {destination}: {source}"))]
    Upload {
        destination: String,
        source: StorageError,
    },

    /// Sink could not be constructed.
    #[snafu(display("Failed to open sink: {source}"))]
    SinkSetup { source: StorageError },
}

/// Top-level collector errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CollectorError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Metrics setup error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    /// Checkpoint error.
    #[snafu(display("Checkpoint error: {source}"))]
    Checkpoint { source: CheckpointError },

    /// Fetch error.
    #[snafu(display("Fetch error: {source}"))]
    Fetch { source: FetchError },

    /// Spool error.
    #[snafu(display("Spool error: {source}"))]
    Spool { source: SpoolError },

    /// Sink error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// The drain task panicked or was cancelled.
    #[snafu(display("Drain task failed: {source}"))]
    DrainTask { source: tokio::task::JoinError },

    /// Fetched and written record counts disagree.
    #[snafu(display("Spooled {written} records but fetched {fetched}"))]
    RecordCountMismatch { fetched: usize, written: usize },
}

impl From<ConfigError> for CollectorError {
    fn from(source: ConfigError) -> Self {
        CollectorError::Config { source }
    }
}

impl From<CheckpointError> for CollectorError {
    fn from(source: CheckpointError) -> Self {
        CollectorError::Checkpoint { source }
    }
}

impl From<FetchError> for CollectorError {
    fn from(source: FetchError) -> Self {
        CollectorError::Fetch { source }
    }
}

impl From<SpoolError> for CollectorError {
    fn from(source: SpoolError) -> Self {
        CollectorError::Spool { source }
    }
}

impl From<SinkError> for CollectorError {
    fn from(source: SinkError) -> Self {
        CollectorError::Sink { source }
    }
}

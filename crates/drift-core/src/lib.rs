//! drift-core: runtime plumbing for the drift collector.
//!
//! - `config/` - YAML loading, environment interpolation, CLI arguments
//! - `storage/` - Storage abstraction (local filesystem, GCS, S3)
//! - `metrics/` - Prometheus metrics infrastructure and the `emit!` macro
//! - `polling` - Generic polling loop trait and runner
//! - `signal` - Signal handling for graceful shutdown
//! - `tracing` - Subscriber setup
//! - `error` - Shared error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod polling;
pub mod signal;
pub mod storage;
pub mod tracing;

pub use config::{CliArgs, DEFAULT_METRICS_ADDR, MetricsConfig};
pub use error::{ConfigError, MetricsError, StorageError};
pub use self::metrics::{
    MetricsController, init_global as init_metrics, init_test as init_metrics_test,
};
pub use polling::{IterationResult, PollingProcessor, random_jitter, run_polling_loop};
pub use signal::{shutdown_signal, shutdown_token};
pub use storage::{StorageProvider, StorageProviderRef};
pub use self::tracing::init_tracing;

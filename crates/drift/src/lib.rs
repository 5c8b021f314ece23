//! drift: periodic Google Workspace audit-log collector.
//!
//! Each cycle pulls the Admin Reports activities of every application for the
//! window since the last checkpoint, spools them to a local batch unit, hands
//! the sealed unit to a sink and only then advances the checkpoint.
//!
//! - `fetch` - paginated record streams from the Reports API
//! - `spool` - bounded buffer and on-disk batch writer
//! - `sink` - hand-off of sealed units to object storage
//! - `checkpoint` - watermark persistence
//! - `scheduler` - the cycle state machine

pub mod app;
pub mod category;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod scheduler;
pub mod sink;
pub mod spool;
pub mod watermark;

// Re-export commonly used items
pub use app::{build_collector, run};
pub use category::Category;
pub use config::Config;
pub use error::CollectorError;
pub use scheduler::{Collector, CyclePhase, CycleReport, PollWindow};

pub use drift_core::{CliArgs, init_tracing, shutdown_token};

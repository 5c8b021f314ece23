//! Collector metrics.
//!
//! Events are emitted with `drift_core::emit!` and recorded by the global
//! Prometheus recorder installed at startup.

pub mod events;

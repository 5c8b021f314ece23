//! Wiring from configuration to a running collector.

use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::error::{
    CheckpointSnafu, CollectorError, FetchSnafu, MetricsSnafu, SinkSnafu, SpoolSnafu,
};
use crate::fetch::{PaginatedFetcher, ReportsClient};
use crate::scheduler::Collector;
use crate::sink::StorageSink;
use crate::spool::BatchWriter;

/// The collector as assembled for production.
pub type ReportsCollector = Collector<PaginatedFetcher<ReportsClient>, StorageSink>;

/// Build every component named by `config`.
pub async fn build_collector(config: &Config) -> Result<ReportsCollector, CollectorError> {
    let name = config.collector.name.as_str();

    let token = config
        .source
        .token_source()
        .ok_or_else(|| crate::error::ConfigError::MissingField {
            field: "source.credentials_file".to_string(),
        })?;
    let client = ReportsClient::new(
        &config.source.base_url,
        &config.source.user_key,
        token,
        config.source.request_timeout(),
    )
    .context(FetchSnafu)?;

    let checkpoints = CheckpointStore::open(
        &config.checkpoint.path,
        config.checkpoint.storage_options.clone(),
        name,
    )
    .await
    .context(CheckpointSnafu)?;

    let sink = StorageSink::open(&config.sink.uri, config.sink.storage_options.clone(), name)
        .await
        .context(SinkSnafu)?;

    let writer = BatchWriter::open(&config.spool.dir, name)
        .await
        .context(SpoolSnafu)?;

    Ok(Collector::new(
        name,
        PaginatedFetcher::new(client),
        sink,
        checkpoints,
        writer,
    ))
}

/// Start metrics, build the collector and poll until `shutdown` fires.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), CollectorError> {
    drift_core::init_metrics(&config.metrics.address).context(MetricsSnafu)?;

    info!(
        target = %config.collector.name,
        source = %config.source.base_url,
        user_key = %config.source.user_key,
        checkpoint = %config.checkpoint.path,
        spool = %config.spool.dir.display(),
        sink = %config.sink.uri,
        "Starting drift collector"
    );

    let mut collector = build_collector(&config).await?;
    collector
        .run(
            config.poll_interval(),
            config.collector.poll_jitter_secs,
            shutdown,
        )
        .await?;

    info!(target = %config.collector.name, "Collector stopped");
    Ok(())
}

//! drift CLI: collect Google Workspace audit logs into object storage.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use drift::{CliArgs, Config, init_tracing, shutdown_token};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    info!(config = %args.config.display(), "Loading config");

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    match drift::run(config, shutdown_token()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Collector failed");
            eprintln!("Collector failed: {e}");
            ExitCode::FAILURE
        }
    }
}

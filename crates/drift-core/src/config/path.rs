//! Command-line arguments.

use std::path::{Path, PathBuf};

use clap::Parser;

/// Check if a path has a YAML extension.
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "yaml" || ext == "yml")
        .unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(version, about = "Periodic audit-log collector")]
pub struct CliArgs {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "DRIFT_CONFIG")]
    pub config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG when set)
    #[arg(short, long, env = "DRIFT_VERBOSE")]
    pub verbose: bool,
}

//! Configuration for the drift collector.
//!
//! ```yaml
//! collector:
//!   name: gsuite
//!   poll_interval_secs: 30
//! source:
//!   credentials_file: /var/run/secrets/gsuite/key.json
//!   impersonated_user: admin@example.com
//! checkpoint:
//!   path: /var/lib/drift/state.json
//! spool:
//!   dir: /var/lib/drift/spool
//! sink:
//!   uri: gs://audit-logs/gsuite
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetch::TokenSource;
pub use drift_core::config::{CliArgs, MetricsConfig};

/// Default upstream API root.
pub const DEFAULT_BASE_URL: &str = "https://admin.googleapis.com";

/// Collector identity and cadence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CollectorConfig {
    /// Label for logs, metrics and output object names.
    #[serde(default = "default_name")]
    pub name: String,
    /// Seconds to sleep between cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Upper bound of random extra sleep per cycle.
    #[serde(default)]
    pub poll_jitter_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            poll_interval_secs: default_poll_interval(),
            poll_jitter_secs: 0,
        }
    }
}

fn default_name() -> String {
    "gsuite".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

/// Upstream Admin Reports API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// `all` or a specific user's email or id.
    #[serde(default = "default_user_key")]
    pub user_key: String,
    /// Bearer token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// File holding the bearer token, re-read before every request.
    #[serde(default)]
    pub access_token_file: Option<PathBuf>,
    /// Service-account JSON key used to mint tokens.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    /// Admin the service account acts for; required with `credentials_file`.
    #[serde(default)]
    pub impersonated_user: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_key() -> String {
    "all".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl SourceConfig {
    /// Token source, once the configuration has been validated.
    pub fn token_source(&self) -> Option<TokenSource> {
        match (
            &self.access_token,
            &self.access_token_file,
            &self.credentials_file,
        ) {
            (Some(token), None, None) => Some(TokenSource::Static(token.clone())),
            (None, Some(path), None) => Some(TokenSource::File(path.clone())),
            (None, None, Some(key_path)) => self
                .impersonated_user
                .as_ref()
                .map(|subject| TokenSource::service_account(key_path, subject)),
            _ => None,
        }
    }

    fn credential_count(&self) -> usize {
        [
            self.access_token.is_some(),
            self.access_token_file.is_some(),
            self.credentials_file.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Checkpoint file location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Local path or storage URL of the checkpoint file.
    pub path: String,
    /// Storage options when `path` is a bucket URL.
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Local spool directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SpoolConfig {
    #[serde(default = "default_spool_dir")]
    pub dir: PathBuf,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            dir: default_spool_dir(),
        }
    }
}

fn default_spool_dir() -> PathBuf {
    std::env::temp_dir().join("drift")
}

/// Destination for sealed batches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Local path, `file://`, `gs://` or `s3://` URL.
    pub uri: String,
    /// Storage options (credentials, region, etc.).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

/// Main configuration for drift.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    pub source: SourceConfig,
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub spool: SpoolConfig,
    pub sink: SinkConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load, interpolate and validate a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = drift_core::config::load_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = drift_core::config::parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field; all problems are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.collector.name.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "collector.name".to_string(),
            });
        } else if self.collector.name.contains('/') {
            errors.push(ConfigError::InvalidField {
                field: "collector.name".to_string(),
                message: "must not contain '/'".to_string(),
            });
        }
        if self.collector.poll_interval_secs == 0 {
            errors.push(ConfigError::InvalidField {
                field: "collector.poll_interval_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let base_url = &self.source.base_url;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            errors.push(ConfigError::InvalidField {
                field: "source.base_url".to_string(),
                message: format!("'{}' is not an http(s) URL", self.source.base_url),
            });
        }
        if self.source.user_key.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "source.user_key".to_string(),
            });
        }
        match self.source.credential_count() {
            0 => errors.push(ConfigError::MissingField {
                field: "source.credentials_file, source.access_token or source.access_token_file"
                    .to_string(),
            }),
            1 => {}
            _ => errors.push(ConfigError::InvalidField {
                field: "source".to_string(),
                message: "set only one of credentials_file, access_token and access_token_file"
                    .to_string(),
            }),
        }
        if self
            .source
            .access_token
            .as_ref()
            .is_some_and(|token| token.trim().is_empty())
        {
            errors.push(ConfigError::MissingField {
                field: "source.access_token".to_string(),
            });
        }
        let impersonated_user = self
            .source
            .impersonated_user
            .as_deref()
            .map(str::trim)
            .filter(|user| !user.is_empty());
        match (&self.source.credentials_file, impersonated_user) {
            (Some(_), None) => errors.push(ConfigError::MissingField {
                field: "source.impersonated_user".to_string(),
            }),
            (None, Some(_)) => errors.push(ConfigError::InvalidField {
                field: "source.impersonated_user".to_string(),
                message: "only used with credentials_file".to_string(),
            }),
            _ => {}
        }
        if self.source.request_timeout_secs == 0 {
            errors.push(ConfigError::InvalidField {
                field: "source.request_timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.checkpoint.path.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "checkpoint.path".to_string(),
            });
        }
        if self.spool.dir.as_os_str().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "spool.dir".to_string(),
            });
        }
        if self.sink.uri.trim().is_empty() {
            errors.push(ConfigError::MissingField {
                field: "sink.uri".to_string(),
            });
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleErrors {
                errors: errors.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.collector.poll_interval_secs)
    }
}

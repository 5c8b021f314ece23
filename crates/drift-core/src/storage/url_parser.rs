//! URL parsing for storage backends.
//!
//! Maps a sink or checkpoint location onto a backend configuration. Accepted
//! forms are S3 and GCS URLs, `file://` URIs, and plain filesystem paths
//! (absolute, or relative to the working directory).

use object_store::path::Path;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{GcsConfig, LocalConfig, S3Config};

const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>/.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Local,
}

/// Matchers in evaluation order.
static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (Backend::S3, S3_PATH),
        (Backend::S3, S3_ENDPOINT_URL),
        (Backend::S3, S3_URL),
        (Backend::Gcs, GCS_PATH),
        (Backend::Gcs, GCS_URL),
        (Backend::Local, FILE_URI),
        (Backend::Local, FILE_PATH),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("valid storage URL regex")))
    .collect()
});

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL or filesystem path into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        if url.is_empty() {
            return InvalidUrlSnafu { url }.fail();
        }

        // Relative paths have no scheme and are resolved against the working directory.
        if !url.contains("://") && !url.contains("::") && !url.starts_with('/') {
            let cwd = std::env::current_dir().map_err(|_| InvalidUrlSnafu { url }.build())?;
            return Ok(BackendConfig::Local(LocalConfig {
                path: cwd.join(url).to_string_lossy().into_owned(),
            }));
        }

        for (backend, regex) in MATCHERS.iter() {
            if let Some(caps) = regex.captures(url) {
                return Ok(match backend {
                    Backend::S3 => Self::parse_s3(&caps),
                    Backend::Gcs => Self::parse_gcs(&caps),
                    Backend::Local => Self::parse_local(&caps),
                });
            }
        }

        InvalidUrlSnafu { url }.fail()
    }

    fn parse_s3(caps: &regex::Captures) -> Self {
        let bucket = caps["bucket"].to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| caps.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            caps.name("endpoint").map(|endpoint| {
                let port = caps
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = caps.name("protocol").map(|p| p.as_str()).unwrap_or("https");
                format!("{protocol}://{}:{port}", endpoint.as_str())
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key: caps.name("key").map(|m| Path::from(m.as_str())),
        })
    }

    fn parse_gcs(caps: &regex::Captures) -> Self {
        BackendConfig::Gcs(GcsConfig {
            bucket: caps["bucket"].to_string(),
            key: caps.name("key").map(|m| Path::from(m.as_str())),
        })
    }

    fn parse_local(caps: &regex::Captures) -> Self {
        let path = caps["path"].trim_end_matches('/');
        let path = if path.is_empty() { "/" } else { path };
        BackendConfig::Local(LocalConfig {
            path: path.to_string(),
        })
    }

    /// Key prefix applied to every path on this backend.
    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

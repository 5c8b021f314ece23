//! YAML configuration loading with environment interpolation.

use std::path::Path;

use serde::de::DeserializeOwned;
use snafu::prelude::*;

use crate::config::{interpolate, is_yaml_file};
use crate::error::{
    ConfigError, EnvInterpolationSnafu, ReadFileSnafu, UnsupportedFormatSnafu, YamlParseSnafu,
};

/// Read a YAML file, interpolate environment variables and deserialize it.
pub fn load_yaml_file<C: DeserializeOwned>(path: &Path) -> Result<C, ConfigError> {
    ensure!(
        is_yaml_file(path),
        UnsupportedFormatSnafu {
            path: path.to_path_buf()
        }
    );

    let contents = std::fs::read_to_string(path).context(ReadFileSnafu {
        path: path.to_path_buf(),
    })?;

    parse_yaml(&contents)
}

/// Interpolate environment variables in `contents` and deserialize it.
pub fn parse_yaml<C: DeserializeOwned>(contents: &str) -> Result<C, ConfigError> {
    let result = interpolate(contents);
    if !result.is_ok() {
        return EnvInterpolationSnafu {
            message: result.errors.join("\n"),
        }
        .fail();
    }

    serde_yaml::from_str(&result.text).context(YamlParseSnafu)
}

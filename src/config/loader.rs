//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// File read when neither an argument nor the environment names one.
pub const DEFAULT_CONFIG_PATH: &str = "ssp.toml";

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "SSP_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Configuration file to use: the explicit argument, then `SSP_CONFIG`,
/// then `ssp.toml`. A missing default file yields the default configuration.
pub fn resolve_config(argument: Option<String>) -> Result<ProxyConfig, ConfigError> {
    if let Some(path) = argument.or_else(|| std::env::var(CONFIG_ENV).ok()) {
        return load_config(Path::new(&path));
    }

    let default = Path::new(DEFAULT_CONFIG_PATH);
    if default.exists() {
        load_config(default)
    } else {
        Ok(ProxyConfig::default())
    }
}

//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::LameduckConfig;
use crate::config::validation::{validate_config, Settings, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<LameduckConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load a TOML file, returning the raw config alongside its resolved settings.
pub fn load_config(path: &Path) -> Result<(LameduckConfig, Settings), ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    let settings = validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), signals = ?settings.signals, "Configuration loaded");
    Ok((config, settings))
}

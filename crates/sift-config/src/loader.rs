//! Loading configuration from TOML.

use crate::config::SiftConfig;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loading error
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed values are out of range
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Loads and validates [`SiftConfig`]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<SiftConfig> {
        let config: SiftConfig = toml::from_str(content)?;
        Self::validate(&config)?;
        debug!(
            default_page_size = config.query.default_page_size,
            embedded = config.paths.embedded.len(),
            relations = config.relational.relations.len(),
            "Parsed sift config"
        );
        Ok(config)
    }

    /// Read and parse a TOML file
    pub async fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<SiftConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading sift config");

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(config: &SiftConfig) -> ConfigResult<()> {
        if config.query.default_page_size == 0 {
            return Err(ConfigError::Validation(
                "query.default_page_size must be greater than 0".to_string(),
            ));
        }
        if let Some(max) = config.query.max_page_size {
            if max < config.query.default_page_size {
                return Err(ConfigError::Validation(format!(
                    "query.max_page_size ({}) is smaller than query.default_page_size ({})",
                    max, config.query.default_page_size
                )));
            }
        }
        if config.update.id_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "update.id_field must not be blank".to_string(),
            ));
        }
        if config.paths.left_join_marker == '.' {
            return Err(ConfigError::Validation(
                "paths.left_join_marker must differ from the path separator".to_string(),
            ));
        }
        Ok(())
    }
}

//! YAML configuration parsing.
//!
//! Parses and validates the service configuration file.

use chrono_tz::Tz;
use std::path::Path;

use super::error::ConfigError;
use super::types::ServiceConfig;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate the service configuration from a file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;

        let config: ServiceConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Parse and validate the service configuration from a YAML string.
    pub fn parse_config(yaml: &str) -> Result<ServiceConfig, ConfigError> {
        // An empty document means "all defaults".
        let config: ServiceConfig = if yaml.trim().is_empty() {
            ServiceConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(config: &ServiceConfig) -> Result<(), ConfigError> {
        if config.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be greater than 0".to_string(),
            ));
        }

        let dispatcher = &config.dispatcher;
        if dispatcher.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "dispatcher.tick_interval_secs must be greater than 0".to_string(),
            ));
        }
        if dispatcher.lock_lifetime_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "dispatcher.lock_lifetime_secs must be greater than 0".to_string(),
            ));
        }
        if dispatcher.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "dispatcher.batch_size must be greater than 0".to_string(),
            ));
        }
        if dispatcher.max_concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "dispatcher.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if dispatcher.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "dispatcher.timezone '{}' is not a valid IANA timezone",
                dispatcher.timezone
            )));
        }

        if let Some(domain) = &config.cors.allowed_domain {
            if domain.is_empty() || domain.contains("://") || domain.contains('/') {
                return Err(ConfigError::InvalidConfig(format!(
                    "cors.allowed_domain '{}' must be a bare host name",
                    domain
                )));
            }
        }

        Ok(())
    }
}

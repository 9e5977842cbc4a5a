//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the service.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::{
    CorsConfig, DispatcherConfig, ServerConfig, ServiceConfig, StorageConfig, StorageKind,
    StorageSettings,
};
pub use yaml::YamlLoader;

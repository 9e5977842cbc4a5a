//! Configuration type definitions.
//!
//! This module contains the type definitions for the service YAML file:
//! server, storage, dispatcher and CORS sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::storage::UniqueConflict;

/// Service configuration (dca.yaml). Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub storage: StorageSettings,
    pub dispatcher: DispatcherConfig,
    pub cors: CorsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Storage backend selection and unique-conflict policy.
///
/// `type` defaults to `sqlite` and `path` to `dca.db`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    /// Database file, used by the sqlite backend.
    pub path: String,
    /// What to do when a wallet already has a schedule.
    pub on_unique_conflict: UniqueConflict,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            kind: StorageKind::default(),
            path: default_sqlite_path(),
            on_unique_conflict: UniqueConflict::default(),
        }
    }
}

impl StorageSettings {
    /// The backend to open.
    pub fn backend(&self) -> StorageConfig {
        match self.kind {
            StorageKind::Memory => StorageConfig::Memory,
            StorageKind::Sqlite => StorageConfig::Sqlite {
                path: self.path.clone(),
            },
        }
    }
}

/// Value of `storage.type`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// In-memory storage (non-persistent).
    Memory,
    #[default]
    Sqlite,
}

/// Storage backend.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Memory,
    /// SQLite storage at a database file.
    Sqlite { path: String },
}

fn default_sqlite_path() -> String {
    "dca.db".to_string()
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Whether due jobs are executed by this process.
    pub enabled: bool,
    pub tick_interval_secs: u64,
    /// How long a claimed job stays locked.
    pub lock_lifetime_secs: u64,
    /// Maximum jobs claimed per tick.
    pub batch_size: usize,
    /// Maximum concurrent swap executions.
    pub max_concurrency: usize,
    /// Timezone cron intervals are evaluated in.
    pub timezone: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 5,
            lock_lifetime_secs: 600,
            batch_size: 16,
            max_concurrency: 4,
            timezone: "UTC".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn lock_lifetime(&self) -> Duration {
        Duration::from_secs(self.lock_lifetime_secs)
    }
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Domain allowed over http or https.
    pub allowed_domain: Option<String>,
    /// Also allow localhost origins.
    pub development: bool,
}

//! Core identifier types for DCA schedules.
//!
//! These types provide type-safe identifiers for schedules and the wallets
//! that own them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a DCA schedule (a stored job).
///
/// Opaque to callers: the store generates it, clients echo it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

/// Address of the wallet that owns a schedule.
///
/// Compared by exact string match; no case folding is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

/// Version tag of the app a schedule runs under.
///
/// Clients send either a number or a string; the tag is carried as sent and
/// never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppVersion {
    Int(i64),
    Str(String),
}

/// Error returned when a wallet address is blank.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("wallet address must not be empty")]
pub struct InvalidWalletAddress;

impl ScheduleId {
    /// Generate a fresh random ScheduleId.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ScheduleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ScheduleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl WalletAddress {
    /// Create a wallet address, trimming surrounding whitespace.
    pub fn new(address: impl AsRef<str>) -> Result<Self, InvalidWalletAddress> {
        let trimmed = address.as_ref().trim();
        if trimmed.is_empty() {
            return Err(InvalidWalletAddress);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletAddress {
    type Err = InvalidWalletAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = InvalidWalletAddress;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AppVersion {
    fn from(version: i64) -> Self {
        AppVersion::Int(version)
    }
}

impl From<i32> for AppVersion {
    fn from(version: i32) -> Self {
        AppVersion::Int(i64::from(version))
    }
}

impl From<u32> for AppVersion {
    fn from(version: u32) -> Self {
        AppVersion::Int(i64::from(version))
    }
}

impl From<&str> for AppVersion {
    fn from(version: &str) -> Self {
        AppVersion::Str(version.to_string())
    }
}

impl From<String> for AppVersion {
    fn from(version: String) -> Self {
        AppVersion::Str(version)
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppVersion::Int(version) => write!(f, "{}", version),
            AppVersion::Str(version) => write!(f, "{}", version),
        }
    }
}

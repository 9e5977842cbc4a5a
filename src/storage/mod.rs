//! Storage abstraction for persisting DCA jobs and purchase history.
//!
//! This module provides a trait-based job store with pluggable backends
//! (in-memory, SQLite).

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::InMemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use crate::core::job::{FinishedRun, JobFilter};
use crate::core::job::{DcaJobParams, Job};
use crate::core::types::{AppVersion, ScheduleId, WalletAddress};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint was violated.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The backing store could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

/// What to do when saving a new job whose unique constraint matches
/// another stored job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniqueConflict {
    /// Fail the save with [`StorageError::DuplicateKey`].
    #[default]
    Reject,
    /// Overwrite the existing record, keeping its id.
    Replace,
}

/// Outcome of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Succeeded,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Succeeded => "succeeded",
            PurchaseStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(PurchaseStatus::Succeeded),
            "failed" => Ok(PurchaseStatus::Failed),
            other => Err(StorageError::SerializationError(format!(
                "unknown purchase status: {}",
                other
            ))),
        }
    }
}

/// One execution of a DCA job, kept as purchase history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub schedule_id: ScheduleId,
    pub wallet_address: WalletAddress,
    pub vincent_app_version: AppVersion,
    pub status: PurchaseStatus,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// A successful purchase for `job`.
    pub fn succeeded(job: &Job, tx_hash: Option<String>, executed_at: DateTime<Utc>) -> Self {
        Self::from_job(job, PurchaseStatus::Succeeded, tx_hash, None, executed_at)
    }

    /// A failed purchase attempt for `job`.
    pub fn failed(job: &Job, error: impl Into<String>, executed_at: DateTime<Utc>) -> Self {
        Self::from_job(job, PurchaseStatus::Failed, None, Some(error.into()), executed_at)
    }

    fn from_job(
        job: &Job,
        status: PurchaseStatus,
        tx_hash: Option<String>,
        error: Option<String>,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id: job.id.clone(),
            wallet_address: job.data.wallet_address.clone(),
            vincent_app_version: job.data.vincent_app_version.clone(),
            status,
            tx_hash,
            error,
            executed_at,
        }
    }
}

/// Job store trait for persisting DCA jobs.
///
/// Uniqueness constraints registered on a job are enforced atomically by
/// [`JobStore::save`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Build a new, unsaved job instance.
    fn create(&self, name: &str, data: DcaJobParams) -> Job {
        Job::new(name, data)
    }

    /// List jobs matching the filter, in creation order.
    async fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StorageError>;

    /// Insert or update a job, enforcing its unique constraint.
    ///
    /// Updating an existing id keeps the dispatcher's lock and any run
    /// finished after the caller read the job (see [`Job::merge_run_state`]).
    /// Returns the job as stored (its id may differ from the input when an
    /// existing record is replaced).
    async fn save(&self, job: Job) -> Result<Job, StorageError>;

    /// Delete every job matching the filter and return how many were removed.
    async fn cancel(&self, filter: &JobFilter) -> Result<u64, StorageError>;

    /// Lock and return up to `limit` due jobs, oldest `next_run_at` first.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, StorageError>;

    /// Apply a finished run to the stored job, if it still exists.
    async fn finish_run(&self, run: FinishedRun) -> Result<Option<Job>, StorageError>;

    /// Append a purchase to the history.
    async fn record_purchase(&self, purchase: PurchaseRecord) -> Result<(), StorageError>;

    /// List a wallet's purchases, newest first.
    async fn list_purchases(
        &self,
        wallet_address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<PurchaseRecord>, StorageError>;
}

/// Error for a unique constraint collision.
pub(crate) fn duplicate(job: &Job) -> StorageError {
    StorageError::DuplicateKey(format!(
        "dca schedule already exists for wallet {}",
        job.data.wallet_address
    ))
}

/// Cutoff before which a lock is considered stale.
pub(crate) fn stale_before(now: DateTime<Utc>, lock_lifetime: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lock_lifetime)
        .ok()
        .and_then(|lifetime| now.checked_sub_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn reject_empty(filter: &JobFilter) -> Result<(), StorageError> {
    if filter.is_empty() {
        return Err(StorageError::Other(
            "refusing to cancel with an empty filter".to_string(),
        ));
    }
    Ok(())
}

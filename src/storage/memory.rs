//! In-memory storage implementation.
//!
//! Provides a thread-safe in-memory backend for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use std::time::Duration;

use super::{
    FinishedRun, JobFilter, JobStore, PurchaseRecord, StorageError, UniqueConflict, duplicate,
    reject_empty, stale_before,
};
use crate::core::job::Job;
use crate::core::types::WalletAddress;

/// In-memory storage backend.
///
/// Thread-safe storage using RwLock for concurrent access. Jobs are kept in
/// insertion order. Data is not persisted across restarts.
pub struct InMemoryStorage {
    jobs: RwLock<Vec<Job>>,
    purchases: RwLock<Vec<PurchaseRecord>>,
    on_conflict: UniqueConflict,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage that rejects unique conflicts.
    pub fn new() -> Self {
        Self::with_conflict_policy(UniqueConflict::Reject)
    }

    /// Create a new empty in-memory storage with the given conflict policy.
    pub fn with_conflict_policy(on_conflict: UniqueConflict) -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            purchases: RwLock::new(Vec::new()),
            on_conflict,
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStorage {
    async fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StorageError> {
        let jobs = self.jobs.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(jobs.iter().filter(|j| filter.matches(j)).cloned().collect())
    }

    async fn save(&self, job: Job) -> Result<Job, StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;

        let conflict = job.unique.as_ref().and_then(|filter| {
            jobs.iter()
                .find(|other| other.id != job.id && other.name == job.name && filter.matches(other))
                .map(|other| (other.id.clone(), other.created_at))
        });

        if let Some((existing_id, created_at)) = conflict {
            if self.on_conflict == UniqueConflict::Reject {
                return Err(duplicate(&job));
            }

            jobs.retain(|j| j.id != job.id);
            let mut replaced = job;
            replaced.id = existing_id;
            replaced.created_at = created_at;
            if let Some(slot) = jobs.iter_mut().find(|j| j.id == replaced.id) {
                *slot = replaced.clone();
            }
            return Ok(replaced);
        }

        let mut job = job;
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(slot) => {
                job.merge_run_state(slot);
                *slot = job.clone();
            }
            None => jobs.push(job.clone()),
        }
        Ok(job)
    }

    async fn cancel(&self, filter: &JobFilter) -> Result<u64, StorageError> {
        reject_empty(filter)?;
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = jobs.len();
        jobs.retain(|j| !filter.matches(j));
        Ok((before - jobs.len()) as u64)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, StorageError> {
        let stale = stale_before(now, lock_lifetime);
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;

        let mut due: Vec<&mut Job> = jobs.iter_mut().filter(|j| j.is_due(now, stale)).collect();
        due.sort_by_key(|j| j.next_run_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|job| {
                job.locked_at = Some(now);
                job.clone()
            })
            .collect())
    }

    async fn finish_run(&self, run: FinishedRun) -> Result<Option<Job>, StorageError> {
        let mut jobs = self.jobs.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(jobs.iter_mut().find(|j| j.id == run.id).map(|job| {
            job.complete_run(&run);
            job.clone()
        }))
    }

    async fn record_purchase(&self, purchase: PurchaseRecord) -> Result<(), StorageError> {
        let mut purchases = self
            .purchases
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        purchases.push(purchase);
        Ok(())
    }

    async fn list_purchases(
        &self,
        wallet_address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<PurchaseRecord>, StorageError> {
        let purchases = self
            .purchases
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut result: Vec<_> = purchases
            .iter()
            .rev()
            .filter(|p| &p.wallet_address == wallet_address)
            .cloned()
            .collect();
        // Sort by executed_at descending (most recent first)
        result.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        result.truncate(limit);
        Ok(result)
    }
}

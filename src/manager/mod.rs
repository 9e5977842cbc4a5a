//! DCA job lifecycle manager.
//!
//! Creates, finds, edits, enables, disables and cancels the single recurring
//! swap job each wallet may own. Every lookup is scoped by both schedule id
//! and wallet address; the one-job-per-wallet rule is enforced by the store.

mod error;

pub use error::ManagerError;

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::core::job::{DCA_SWAP_JOB_NAME, DcaJobInput, Job, JobFilter, now_millis, stamp_after};
use crate::core::types::{ScheduleId, WalletAddress};
use crate::storage::{JobStore, PurchaseRecord};

/// How a newly created job is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOptions {
    /// Repeat on a human interval ("1 day") or cron expression.
    Interval(String),
    /// Run once: RFC 3339 instant, relative interval, or next cron occurrence.
    Schedule(String),
    /// Save without a run time; never fired.
    Unscheduled,
}

/// Parameters for [`DcaJobManager::find_job`].
#[derive(Debug, Clone)]
pub struct FindJobParams {
    pub schedule_id: ScheduleId,
    pub wallet_address: WalletAddress,
    /// Fail with [`ManagerError::NotFound`] instead of returning `None`.
    pub must_exist: bool,
}

/// Lifecycle operations over a [`JobStore`].
pub struct DcaJobManager<S: JobStore> {
    store: Arc<S>,
    timezone: String,
}

impl<S: JobStore> Clone for DcaJobManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            timezone: self.timezone.clone(),
        }
    }
}

impl<S: JobStore> DcaJobManager<S> {
    /// Create a manager evaluating cron intervals in UTC.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_timezone(store, "UTC")
    }

    /// Create a manager evaluating cron intervals in the given timezone.
    pub fn with_timezone(store: Arc<S>, timezone: impl Into<String>) -> Self {
        Self {
            store,
            timezone: timezone.into(),
        }
    }

    /// The underlying job store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Every job owned by the wallet, in creation order.
    pub async fn list_jobs_by_wallet_address(
        &self,
        wallet_address: &WalletAddress,
    ) -> Result<Vec<Job>, ManagerError> {
        let jobs = self
            .store
            .query(&JobFilter::by_wallet(wallet_address.clone()))
            .await?;
        debug!(wallet_address = %wallet_address, count = jobs.len(), "Listed DCA schedules");
        Ok(jobs)
    }

    /// Find a job by id, scoped to its owner.
    pub async fn find_job(&self, params: FindJobParams) -> Result<Option<Job>, ManagerError> {
        let FindJobParams {
            schedule_id,
            wallet_address,
            must_exist,
        } = params;

        let mut jobs = self
            .store
            .query(&JobFilter::owned(schedule_id.clone(), wallet_address.clone()))
            .await?;

        if jobs.len() > 1 {
            error!(
                schedule_id = %schedule_id,
                wallet_address = %wallet_address,
                count = jobs.len(),
                "Multiple DCA schedules share one ID"
            );
            return Err(ManagerError::Integrity {
                schedule_id,
                count: jobs.len(),
            });
        }

        match jobs.pop() {
            Some(job) => Ok(Some(job)),
            None if must_exist => Err(ManagerError::NotFound(schedule_id)),
            None => Ok(None),
        }
    }

    async fn require_job(
        &self,
        schedule_id: &ScheduleId,
        wallet_address: &WalletAddress,
    ) -> Result<Job, ManagerError> {
        self.find_job(FindJobParams {
            schedule_id: schedule_id.clone(),
            wallet_address: wallet_address.clone(),
            must_exist: true,
        })
        .await?
        .ok_or_else(|| ManagerError::NotFound(schedule_id.clone()))
    }

    /// Create and persist the wallet's DCA job.
    pub async fn create_job(
        &self,
        input: DcaJobInput,
        options: ScheduleOptions,
    ) -> Result<Job, ManagerError> {
        let wallet_address = input.wallet_address.clone();
        let mut job = self
            .store
            .create(DCA_SWAP_JOB_NAME, input.stamped(now_millis()));
        job.unique(JobFilter::by_wallet(wallet_address.clone()));

        match &options {
            ScheduleOptions::Interval(interval) => {
                job.repeat_every(interval, &self.timezone)?;
            }
            ScheduleOptions::Schedule(when) => {
                job.schedule(when, &self.timezone)?;
            }
            ScheduleOptions::Unscheduled => {}
        }

        let job = self.store.save(job).await?;
        info!(
            schedule_id = %job.id,
            wallet_address = %wallet_address,
            repeat_interval = job.repeat_interval.as_deref().unwrap_or("-"),
            "Created DCA schedule"
        );
        Ok(job)
    }

    /// Replace a job's data wholesale, resetting its recurrence if the
    /// purchase interval changed.
    pub async fn edit_job(
        &self,
        schedule_id: &ScheduleId,
        input: DcaJobInput,
    ) -> Result<Job, ManagerError> {
        let mut job = self.require_job(schedule_id, &input.wallet_address).await?;

        if job.data.purchase_interval_human != input.purchase_interval_human {
            info!(
                schedule_id = %schedule_id,
                from = %job.data.purchase_interval_human,
                to = %input.purchase_interval_human,
                "DCA schedule interval changed"
            );
            job.repeat_every(&input.purchase_interval_human, &self.timezone)?;
        }

        let updated_at = stamp_after(job.data.updated_at);
        job.data = input.stamped(updated_at);

        let job = self.store.save(job).await?;
        info!(schedule_id = %job.id, wallet_address = %job.data.wallet_address, "Edited DCA schedule");
        Ok(job)
    }

    /// Disable a job; returns `None` if the caller owns no such job.
    pub async fn disable_job(
        &self,
        schedule_id: &ScheduleId,
        wallet_address: &WalletAddress,
    ) -> Result<Option<Job>, ManagerError> {
        let Some(mut job) = self
            .find_job(FindJobParams {
                schedule_id: schedule_id.clone(),
                wallet_address: wallet_address.clone(),
                must_exist: false,
            })
            .await?
        else {
            debug!(schedule_id = %schedule_id, wallet_address = %wallet_address, "No DCA schedule to disable");
            return Ok(None);
        };

        job.disable();
        job.touch();
        let job = self.store.save(job).await?;
        info!(schedule_id = %job.id, wallet_address = %wallet_address, "Disabled DCA schedule");
        Ok(Some(job))
    }

    /// Enable a job the caller owns.
    pub async fn enable_job(
        &self,
        schedule_id: &ScheduleId,
        wallet_address: &WalletAddress,
    ) -> Result<Job, ManagerError> {
        let mut job = self.require_job(schedule_id, wallet_address).await?;

        job.touch();
        job.enable();
        let job = self.store.save(job).await?;
        info!(schedule_id = %job.id, wallet_address = %wallet_address, "Enabled DCA schedule");
        Ok(job)
    }

    /// Delete the caller's job and return how many records were removed.
    pub async fn cancel_job(
        &self,
        schedule_id: &ScheduleId,
        wallet_address: &WalletAddress,
    ) -> Result<u64, ManagerError> {
        let removed = self
            .store
            .cancel(&JobFilter::owned(schedule_id.clone(), wallet_address.clone()))
            .await?;
        info!(schedule_id = %schedule_id, wallet_address = %wallet_address, removed, "Canceled DCA schedule");
        Ok(removed)
    }

    /// The wallet's most recent purchases, newest first.
    pub async fn list_purchases(
        &self,
        wallet_address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<PurchaseRecord>, ManagerError> {
        Ok(self.store.list_purchases(wallet_address, limit).await?)
    }
}

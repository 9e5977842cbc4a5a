//! The DCA swap job record and its in-memory mutation primitives.
//!
//! A [`Job`] is built unsaved, mutated in memory (`unique`, `repeat_every`,
//! `schedule`, `enable`, `disable`) and then persisted through a
//! [`JobStore`](crate::storage::JobStore), which enforces any uniqueness
//! constraint at save time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schedule::{Schedule, ScheduleError, resolve_run_at};
use super::types::{AppVersion, ScheduleId, WalletAddress};

/// Job type name under which DCA swap jobs are stored.
pub const DCA_SWAP_JOB_NAME: &str = "execute-dca-swap";

/// Caller-supplied job data, before the audit timestamp is stamped.
///
/// Members other than the named ones are execution parameters carried
/// opaquely in `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaJobInput {
    pub wallet_address: WalletAddress,
    pub purchase_interval_human: String,
    pub vincent_app_version: AppVersion,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// Job data as persisted on the job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaJobParams {
    pub wallet_address: WalletAddress,
    pub purchase_interval_human: String,
    pub vincent_app_version: AppVersion,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl DcaJobInput {
    /// Create input with no extra execution parameters.
    pub fn new(
        wallet_address: WalletAddress,
        purchase_interval_human: impl Into<String>,
        vincent_app_version: impl Into<AppVersion>,
    ) -> Self {
        Self {
            wallet_address,
            purchase_interval_human: purchase_interval_human.into(),
            vincent_app_version: vincent_app_version.into(),
            params: Map::new(),
        }
    }

    /// Add an execution parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Attach the audit timestamp, producing the stored payload.
    pub fn stamped(self, updated_at: DateTime<Utc>) -> DcaJobParams {
        let mut params = self.params;
        params.remove("updatedAt");
        DcaJobParams {
            wallet_address: self.wallet_address,
            purchase_interval_human: self.purchase_interval_human,
            vincent_app_version: self.vincent_app_version,
            updated_at,
            params,
        }
    }
}

/// Exact-match filter over job records.
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ScheduleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<WalletAddress>,
}

impl JobFilter {
    /// Match a single job id.
    pub fn by_id(id: ScheduleId) -> Self {
        Self {
            id: Some(id),
            wallet_address: None,
        }
    }

    /// Match every job owned by a wallet.
    pub fn by_wallet(wallet_address: WalletAddress) -> Self {
        Self {
            id: None,
            wallet_address: Some(wallet_address),
        }
    }

    /// Match a job id, scoped to its owning wallet.
    pub fn owned(id: ScheduleId, wallet_address: WalletAddress) -> Self {
        Self {
            id: Some(id),
            wallet_address: Some(wallet_address),
        }
    }

    /// Whether the filter has no constraints.
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.wallet_address.is_none()
    }

    /// Whether a job satisfies every constraint of this filter.
    pub fn matches(&self, job: &Job) -> bool {
        self.id.as_ref().is_none_or(|id| &job.id == id)
            && self
                .wallet_address
                .as_ref()
                .is_none_or(|wallet| &job.data.wallet_address == wallet)
    }

    /// Canonical key for the constraint, used to index uniqueness.
    pub fn key(&self) -> String {
        let mut parts = Vec::new();
        if let Some(id) = &self.id {
            parts.push(format!("id={}", id));
        }
        if let Some(wallet) = &self.wallet_address {
            parts.push(format!("data.walletAddress={}", wallet));
        }
        parts.join("&")
    }
}

/// Outcome of one execution of a job, applied by the store after the run.
#[derive(Debug, Clone)]
pub struct FinishedRun {
    pub id: ScheduleId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// A persisted recurring (or one-shot) DCA swap job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job identifier.
    pub id: ScheduleId,
    /// Job type name.
    pub name: String,
    /// Job payload.
    pub data: DcaJobParams,
    /// Disabled jobs are retained but never fired.
    pub disabled: bool,
    /// Repeat interval (human interval or cron), if recurring.
    pub repeat_interval: Option<String>,
    /// Timezone cron repeat intervals are evaluated in.
    pub repeat_timezone: Option<String>,
    /// When the job is next due.
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub fail_reason: Option<String>,
    pub fail_count: u32,
    /// Set while a dispatcher holds the job.
    pub locked_at: Option<DateTime<Utc>>,
    /// Uniqueness constraint enforced when the job is saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<JobFilter>,
    /// When the job instance was built.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a new, unsaved job with a fresh id.
    pub fn new(name: impl Into<String>, data: DcaJobParams) -> Self {
        Self {
            id: ScheduleId::new(),
            name: name.into(),
            data,
            disabled: false,
            repeat_interval: None,
            repeat_timezone: None,
            next_run_at: None,
            last_run_at: None,
            last_finished_at: None,
            failed_at: None,
            fail_reason: None,
            fail_count: 0,
            locked_at: None,
            unique: None,
            created_at: now_millis(),
        }
    }

    /// Register a uniqueness constraint, enforced by the store on save.
    pub fn unique(&mut self, filter: JobFilter) -> &mut Self {
        self.unique = Some(filter);
        self
    }

    /// Repeat the job on the given interval or cron expression.
    ///
    /// A job that never ran keeps its pending run time (or becomes due now
    /// for fixed intervals); a job that ran is rescheduled from its last run.
    pub fn repeat_every(&mut self, interval: &str, timezone: &str) -> Result<&mut Self, ScheduleError> {
        let schedule = Schedule::with_timezone(interval, timezone)?;

        let now = now_millis();
        let next = match (self.last_run_at, schedule.interval()) {
            (Some(last), _) => schedule.next_after(last)?,
            (None, Some(_)) => {
                // The run after the first must be computable too.
                schedule.next_after(now)?;
                self.next_run_at.unwrap_or(now)
            }
            (None, None) => schedule.next_after(now)?,
        };

        self.repeat_interval = Some(interval.to_string());
        self.repeat_timezone = Some(timezone.to_string());
        self.next_run_at = Some(next);
        Ok(self)
    }

    /// Run the job once at the given time (RFC 3339, relative, or cron).
    pub fn schedule(&mut self, when: &str, timezone: &str) -> Result<&mut Self, ScheduleError> {
        let at = resolve_run_at(when, now_millis(), timezone)?;
        self.repeat_interval = None;
        self.repeat_timezone = None;
        self.next_run_at = Some(at);
        Ok(self)
    }

    /// Allow the job to fire.
    pub fn enable(&mut self) -> &mut Self {
        self.disabled = false;
        self
    }

    /// Stop the job from firing without deleting it.
    pub fn disable(&mut self) -> &mut Self {
        self.disabled = true;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Refresh `updatedAt`, strictly later than its previous value.
    pub fn touch(&mut self) -> DateTime<Utc> {
        self.data.updated_at = stamp_after(self.data.updated_at);
        self.data.updated_at
    }

    /// Whether the job is enabled, unlocked (or stale-locked) and due.
    pub fn is_due(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> bool {
        self.is_enabled()
            && self.next_run_at.is_some_and(|at| at <= now)
            && self.locked_at.is_none_or(|locked| locked < stale_before)
    }

    /// Apply a finished run: record its timing and outcome, compute the
    /// next occurrence from the stored repeat interval, release the lock.
    pub fn complete_run(&mut self, run: &FinishedRun) {
        self.last_run_at = Some(run.started_at);
        self.last_finished_at = Some(run.finished_at);
        self.locked_at = None;

        if let Some(error) = &run.error {
            self.failed_at = Some(run.finished_at);
            self.fail_reason = Some(error.clone());
            self.fail_count += 1;
        }

        self.next_run_at = match &self.repeat_interval {
            Some(interval) => {
                let timezone = self.repeat_timezone.as_deref().unwrap_or("UTC");
                match Schedule::with_timezone(interval.as_str(), timezone)
                    .and_then(|schedule| schedule.next_after(run.started_at))
                {
                    Ok(next) => Some(next),
                    Err(e) => {
                        tracing::warn!(schedule_id = %self.id, error = %e, "Failed to compute next run");
                        self.failed_at = Some(run.finished_at);
                        self.fail_reason = Some(format!("failed to compute next run: {}", e));
                        None
                    }
                }
            }
            None => None,
        };
    }

    /// Carry over dispatcher state recorded on `stored` since this copy was
    /// read, so saving a stale copy cannot undo a claim or a finished run.
    ///
    /// The lock always comes from `stored`. Run bookkeeping is taken when
    /// `stored` ran more recently; its `next_run_at` is kept unless this copy
    /// changed the recurrence, in which case the next run is recomputed from
    /// the newer `last_run_at`.
    pub fn merge_run_state(&mut self, stored: &Job) {
        self.locked_at = stored.locked_at;

        if stored.last_run_at <= self.last_run_at {
            return;
        }

        self.last_run_at = stored.last_run_at;
        self.last_finished_at = stored.last_finished_at;
        self.failed_at = stored.failed_at;
        self.fail_reason = stored.fail_reason.clone();
        self.fail_count = stored.fail_count;

        if self.repeat_interval == stored.repeat_interval
            && self.repeat_timezone == stored.repeat_timezone
        {
            self.next_run_at = stored.next_run_at;
            return;
        }

        if let (Some(interval), Some(last)) = (&self.repeat_interval, self.last_run_at) {
            let timezone = self.repeat_timezone.as_deref().unwrap_or("UTC");
            match Schedule::with_timezone(interval.as_str(), timezone)
                .and_then(|schedule| schedule.next_after(last))
            {
                Ok(next) => self.next_run_at = Some(next),
                Err(e) => {
                    tracing::warn!(schedule_id = %self.id, error = %e, "Failed to recompute next run");
                }
            }
        }
    }
}

/// Current time truncated to millisecond precision.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// A millisecond timestamp strictly later than `previous`.
pub fn stamp_after(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now_millis();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::milliseconds(1)
    }
}

//! SQLite storage implementation.
//!
//! Provides persistent storage using SQLite database. Job data is stored as
//! a JSON column; the owning wallet and the unique key are projected into
//! indexed columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use super::{
    FinishedRun, JobFilter, JobStore, PurchaseRecord, StorageError,
    UniqueConflict, duplicate, reject_empty, stale_before,
};
use crate::core::job::Job;
use crate::core::types::{ScheduleId, WalletAddress};

/// How long a connection waits for another writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Write transactions take the database write lock when they begin.
const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

const JOB_COLUMNS: &str = "id, name, data, unique_filter, disabled, repeat_interval, \
     repeat_timezone, next_run_at, last_run_at, last_finished_at, failed_at, fail_reason, \
     fail_count, locked_at, created_at";

/// SQLite storage backend.
///
/// Provides persistent storage with automatic schema migration.
pub struct SqliteStorage {
    pool: SqlitePool,
    on_conflict: UniqueConflict,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given database path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path_str = path.as_ref().to_string_lossy();
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path_str))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let storage = Self {
            pool,
            on_conflict: UniqueConflict::Reject,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (useful for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Other(e.to_string()))?
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_error)?;

        let storage = Self {
            pool,
            on_conflict: UniqueConflict::Reject,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Set the policy applied when a new job collides with a unique key.
    pub fn with_conflict_policy(mut self, on_conflict: UniqueConflict) -> Self {
        self.on_conflict = on_conflict;
        self
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn db_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Other(other.to_string()),
    }
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::SerializationError(format!("invalid timestamp: {}", millis)))
}

fn opt_from_millis(millis: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    millis.map(from_millis).transpose()
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    name: String,
    data: String,
    unique_filter: Option<String>,
    disabled: bool,
    repeat_interval: Option<String>,
    repeat_timezone: Option<String>,
    next_run_at: Option<i64>,
    last_run_at: Option<i64>,
    last_finished_at: Option<i64>,
    failed_at: Option<i64>,
    fail_reason: Option<String>,
    fail_count: i64,
    locked_at: Option<i64>,
    created_at: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: ScheduleId::from(row.id),
            name: row.name,
            data: serde_json::from_str(&row.data)?,
            disabled: row.disabled,
            repeat_interval: row.repeat_interval,
            repeat_timezone: row.repeat_timezone,
            next_run_at: opt_from_millis(row.next_run_at)?,
            last_run_at: opt_from_millis(row.last_run_at)?,
            last_finished_at: opt_from_millis(row.last_finished_at)?,
            failed_at: opt_from_millis(row.failed_at)?,
            fail_reason: row.fail_reason,
            fail_count: u32::try_from(row.fail_count).unwrap_or(u32::MAX),
            locked_at: opt_from_millis(row.locked_at)?,
            unique: row
                .unique_filter
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: from_millis(row.created_at)?,
        })
    }
}

async fn fetch_job(conn: &mut SqliteConnection, id: &ScheduleId) -> Result<Option<Job>, StorageError> {
    let row: Option<JobRow> =
        sqlx::query_as(&format!("SELECT {} FROM dca_jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error)?;
    row.map(Job::try_from).transpose()
}

/// Insert or update a job row by id.
async fn write_job(conn: &mut SqliteConnection, job: &Job) -> Result<(), StorageError> {
    let data = serde_json::to_string(&job.data)?;
    let unique_filter = job.unique.as_ref().map(serde_json::to_string).transpose()?;
    let unique_key = job.unique.as_ref().map(JobFilter::key);

    let result = sqlx::query(
        r#"
        INSERT INTO dca_jobs (
            id, name, wallet_address, unique_key, unique_filter, data, disabled,
            repeat_interval, repeat_timezone, next_run_at, last_run_at, last_finished_at,
            failed_at, fail_reason, fail_count, locked_at, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            wallet_address = excluded.wallet_address,
            unique_key = excluded.unique_key,
            unique_filter = excluded.unique_filter,
            data = excluded.data,
            disabled = excluded.disabled,
            repeat_interval = excluded.repeat_interval,
            repeat_timezone = excluded.repeat_timezone,
            next_run_at = excluded.next_run_at,
            last_run_at = excluded.last_run_at,
            last_finished_at = excluded.last_finished_at,
            failed_at = excluded.failed_at,
            fail_reason = excluded.fail_reason,
            fail_count = excluded.fail_count,
            locked_at = excluded.locked_at
        "#,
    )
    .bind(job.id.as_str())
    .bind(&job.name)
    .bind(job.data.wallet_address.as_str())
    .bind(unique_key)
    .bind(unique_filter)
    .bind(data)
    .bind(job.disabled)
    .bind(&job.repeat_interval)
    .bind(&job.repeat_timezone)
    .bind(job.next_run_at.map(to_millis))
    .bind(job.last_run_at.map(to_millis))
    .bind(job.last_finished_at.map(to_millis))
    .bind(job.failed_at.map(to_millis))
    .bind(&job.fail_reason)
    .bind(i64::from(job.fail_count))
    .bind(job.locked_at.map(to_millis))
    .bind(to_millis(job.created_at))
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(duplicate(job)),
        Err(e) => Err(db_error(e)),
    }
}

#[async_trait]
impl JobStore for SqliteStorage {
    async fn query(&self, filter: &JobFilter) -> Result<Vec<Job>, StorageError> {
        let id = filter.id.as_ref().map(ScheduleId::as_str);
        let wallet = filter.wallet_address.as_ref().map(WalletAddress::as_str);

        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM dca_jobs \
             WHERE (?1 IS NULL OR id = ?1) AND (?2 IS NULL OR wallet_address = ?2) \
             ORDER BY created_at, rowid",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(wallet)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn save(&self, job: Job) -> Result<Job, StorageError> {
        let mut job = job;
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await.map_err(db_error)?;

        let conflict: Option<(String, i64)> = match &job.unique {
            Some(filter) => sqlx::query_as(
                "SELECT id, created_at FROM dca_jobs \
                 WHERE name = ?1 AND id != ?2 \
                 AND (?3 IS NULL OR id = ?3) AND (?4 IS NULL OR wallet_address = ?4) \
                 ORDER BY created_at, rowid LIMIT 1",
            )
            .bind(&job.name)
            .bind(job.id.as_str())
            .bind(filter.id.as_ref().map(ScheduleId::as_str))
            .bind(filter.wallet_address.as_ref().map(WalletAddress::as_str))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?,
            None => None,
        };

        if let Some((existing_id, created_at)) = conflict {
            if self.on_conflict == UniqueConflict::Reject {
                return Err(duplicate(&job));
            }

            sqlx::query("DELETE FROM dca_jobs WHERE id = ?")
                .bind(job.id.as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            job.id = ScheduleId::from(existing_id);
            job.created_at = from_millis(created_at)?;
        } else if let Some(stored) = fetch_job(&mut tx, &job.id).await? {
            job.merge_run_state(&stored);
        }

        write_job(&mut tx, &job).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(job)
    }

    async fn cancel(&self, filter: &JobFilter) -> Result<u64, StorageError> {
        reject_empty(filter)?;
        let result = sqlx::query(
            "DELETE FROM dca_jobs \
             WHERE (?1 IS NULL OR id = ?1) AND (?2 IS NULL OR wallet_address = ?2)",
        )
        .bind(filter.id.as_ref().map(ScheduleId::as_str))
        .bind(filter.wallet_address.as_ref().map(WalletAddress::as_str))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lock_lifetime: Duration,
        limit: usize,
    ) -> Result<Vec<Job>, StorageError> {
        let now_ms = to_millis(now);
        let stale_ms = to_millis(stale_before(now, lock_lifetime));
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await.map_err(db_error)?;

        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {} FROM dca_jobs \
             WHERE disabled = 0 AND next_run_at IS NOT NULL AND next_run_at <= ? \
             AND (locked_at IS NULL OR locked_at < ?) \
             ORDER BY next_run_at LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(now_ms)
        .bind(stale_ms)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let mut job = Job::try_from(row)?;
            let result = sqlx::query(
                "UPDATE dca_jobs SET locked_at = ? \
                 WHERE id = ? AND (locked_at IS NULL OR locked_at < ?)",
            )
            .bind(now_ms)
            .bind(job.id.as_str())
            .bind(stale_ms)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            if result.rows_affected() == 1 {
                job.locked_at = Some(now);
                claimed.push(job);
            }
        }

        tx.commit().await.map_err(db_error)?;
        Ok(claimed)
    }

    async fn finish_run(&self, run: FinishedRun) -> Result<Option<Job>, StorageError> {
        let mut tx = self.pool.begin_with(BEGIN_WRITE).await.map_err(db_error)?;

        let Some(mut job) = fetch_job(&mut tx, &run.id).await? else {
            tx.commit().await.map_err(db_error)?;
            return Ok(None);
        };

        job.complete_run(&run);
        write_job(&mut tx, &job).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(Some(job))
    }

    async fn record_purchase(&self, purchase: PurchaseRecord) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO dca_purchases
                (id, schedule_id, wallet_address, vincent_app_version, status, tx_hash, error, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(purchase.id.to_string())
        .bind(purchase.schedule_id.as_str())
        .bind(purchase.wallet_address.as_str())
        .bind(serde_json::to_string(&purchase.vincent_app_version)?)
        .bind(purchase.status.as_str())
        .bind(&purchase.tx_hash)
        .bind(&purchase.error)
        .bind(to_millis(purchase.executed_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StorageError::DuplicateKey(format!("purchase: {}", purchase.id)),
            ),
            Err(e) => Err(db_error(e)),
        }
    }

    async fn list_purchases(
        &self,
        wallet_address: &WalletAddress,
        limit: usize,
    ) -> Result<Vec<PurchaseRecord>, StorageError> {
        let rows: Vec<(String, String, String, String, String, Option<String>, Option<String>, i64)> =
            sqlx::query_as(
                "SELECT id, schedule_id, wallet_address, vincent_app_version, status, tx_hash, error, executed_at \
                 FROM dca_purchases WHERE wallet_address = ? \
                 ORDER BY executed_at DESC, rowid DESC LIMIT ?",
            )
            .bind(wallet_address.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(PurchaseRecord {
                    id: row
                        .0
                        .parse()
                        .map_err(|e| StorageError::SerializationError(format!("invalid uuid: {}", e)))?,
                    schedule_id: ScheduleId::from(row.1),
                    wallet_address: WalletAddress::new(row.2)
                        .map_err(|e| StorageError::SerializationError(e.to_string()))?,
                    vincent_app_version: serde_json::from_str(&row.3)?,
                    status: row.4.parse()?,
                    tx_hash: row.5,
                    error: row.6,
                    executed_at: from_millis(row.7)?,
                })
            })
            .collect()
    }
}

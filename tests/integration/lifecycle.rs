//! Schedule lifecycle tests against the SQLite store.
//!
//! Verifies persistence across reopen, the one-schedule-per-wallet rule and
//! the manager operations end to end.

use dca::{
    AppVersion, DcaJobInput, DcaJobManager, FindJobParams, FinishedRun, JobFilter, JobStore,
    ManagerError, ScheduleOptions, SqliteStorage, StorageError, UniqueConflict, WalletAddress,
};
use std::sync::Arc;
use tempfile::TempDir;

fn wallet(s: &str) -> WalletAddress {
    WalletAddress::new(s).unwrap()
}

fn input(address: &str, interval: &str) -> DcaJobInput {
    DcaJobInput::new(wallet(address), interval, 7)
        .with_param("purchaseAmount", "10")
        .with_param("tokenOut", "WBTC")
}

async fn open(dir: &TempDir) -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::new(dir.path().join("dca.db")).await.unwrap())
}

/// Test: Schedules survive closing and reopening the database.
#[tokio::test]
async fn test_schedule_persists_across_reopen() {
    let dir = TempDir::new().unwrap();

    let created = {
        let store = open(&dir).await;
        let manager = DcaJobManager::new(Arc::clone(&store));
        let job = manager
            .create_job(input("0xAB", "1 week"), ScheduleOptions::Interval("1 week".to_string()))
            .await
            .unwrap();
        store.close().await;
        job
    };

    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));
    let jobs = manager.list_jobs_by_wallet_address(&wallet("0xAB")).await.unwrap();

    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.id, created.id);
    assert_eq!(job.data, created.data);
    assert_eq!(job.data.params["tokenOut"], "WBTC");
    assert_eq!(job.repeat_interval.as_deref(), Some("1 week"));
    assert_eq!(job.next_run_at, created.next_run_at);
    assert_eq!(job.created_at, created.created_at);
    store.close().await;
}

/// Test: A wallet can hold only one schedule under the default policy.
#[tokio::test]
async fn test_one_schedule_per_wallet() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));

    manager
        .create_job(input("0xAB", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
        .await
        .unwrap();
    let err = manager
        .create_job(input("0xAB", "1 week"), ScheduleOptions::Interval("1 week".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::Storage(StorageError::DuplicateKey(_))));

    // Other wallets are unaffected.
    manager
        .create_job(input("0xCD", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
        .await
        .unwrap();

    let jobs = manager.list_jobs_by_wallet_address(&wallet("0xAB")).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].data.purchase_interval_human, "1 day");
}

/// Test: Under the replace policy a second create overwrites in place.
#[tokio::test]
async fn test_replace_policy_keeps_id() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        SqliteStorage::new(dir.path().join("dca.db"))
            .await
            .unwrap()
            .with_conflict_policy(UniqueConflict::Replace),
    );
    let manager = DcaJobManager::new(Arc::clone(&store));

    let first = manager
        .create_job(input("0xAB", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
        .await
        .unwrap();
    let second = manager
        .create_job(input("0xAB", "1 week"), ScheduleOptions::Interval("1 week".to_string()))
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    let jobs = manager.list_jobs_by_wallet_address(&wallet("0xAB")).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].repeat_interval.as_deref(), Some("1 week"));
}

/// Test: Concurrent creates for distinct wallets all succeed.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_for_distinct_wallets() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));

    let mut handles = Vec::new();
    for i in 0..32 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let address = format!("0x{:02}", i);
            manager
                .create_job(input(&address, "1 day"), ScheduleOptions::Interval("1 day".to_string()))
                .await
        }));
    }

    let mut errors = Vec::new();
    for handle in handles {
        if let Err(e) = handle.await.unwrap() {
            errors.push(e.to_string());
        }
    }
    assert!(errors.is_empty(), "creates failed: {:?}", errors);

    for i in 0..32 {
        let jobs = manager
            .list_jobs_by_wallet_address(&wallet(&format!("0x{:02}", i)))
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
    }
    store.close().await;
}

/// Test: Dispatcher claims and finishes race API writes without failing.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_race_creates() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));

    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = manager.clone();
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let job = manager
                .create_job(
                    input(&format!("0x{:02}", i), "1 day"),
                    ScheduleOptions::Interval("1 day".to_string()),
                )
                .await
                .map_err(|e| e.to_string())?;
            let now = chrono::Utc::now();
            store
                .claim_due(now, std::time::Duration::from_secs(600), 4)
                .await
                .map_err(|e| e.to_string())?;
            store
                .finish_run(FinishedRun {
                    id: job.id,
                    started_at: now,
                    finished_at: now,
                    error: None,
                })
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    store.close().await;
}

/// Test: Concurrent creates for one wallet leave exactly one schedule.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_for_one_wallet() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager
                .create_job(input("0xAB", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            created += 1;
        }
    }
    assert_eq!(created, 1);

    let jobs = store.query(&JobFilter::by_wallet(wallet("0xAB"))).await.unwrap();
    assert_eq!(jobs.len(), 1);
}

/// Test: Edit, disable, enable and cancel through the manager.
#[tokio::test]
async fn test_full_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));
    let owner = wallet("0xAB");

    let job = manager
        .create_job(input("0xAB", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
        .await
        .unwrap();

    let edited = manager
        .edit_job(&job.id, DcaJobInput::new(owner.clone(), "2 days", 8))
        .await
        .unwrap();
    assert_eq!(edited.id, job.id);
    assert_eq!(edited.repeat_interval.as_deref(), Some("2 days"));
    assert_eq!(edited.data.vincent_app_version, AppVersion::Int(8));
    assert!(edited.data.params.is_empty());
    assert!(edited.data.updated_at > job.data.updated_at);

    let disabled = manager.disable_job(&job.id, &owner).await.unwrap().unwrap();
    assert!(disabled.disabled);

    let enabled = manager.enable_job(&job.id, &owner).await.unwrap();
    assert!(!enabled.disabled);

    let found = manager
        .find_job(FindJobParams {
            schedule_id: job.id.clone(),
            wallet_address: owner.clone(),
            must_exist: true,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found, enabled);

    assert_eq!(manager.cancel_job(&job.id, &owner).await.unwrap(), 1);
    assert_eq!(manager.cancel_job(&job.id, &owner).await.unwrap(), 0);

    // After cancellation the wallet may create a new schedule.
    manager
        .create_job(input("0xAB", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
        .await
        .unwrap();
}

/// Test: Another wallet cannot touch a schedule it does not own.
#[tokio::test]
async fn test_ownership_is_enforced() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));
    let intruder = wallet("0xCD");

    let job = manager
        .create_job(input("0xAB", "1 day"), ScheduleOptions::Interval("1 day".to_string()))
        .await
        .unwrap();

    let err = manager
        .edit_job(&job.id, DcaJobInput::new(intruder.clone(), "1 hour", 1))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    assert!(manager.disable_job(&job.id, &intruder).await.unwrap().is_none());
    assert!(manager.enable_job(&job.id, &intruder).await.unwrap_err().is_not_found());
    assert_eq!(manager.cancel_job(&job.id, &intruder).await.unwrap(), 0);

    let stored = manager.list_jobs_by_wallet_address(&wallet("0xAB")).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], job);
}

/// Test: An unscheduled job is stored without a next run.
#[tokio::test]
async fn test_unscheduled_job_never_due() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    let manager = DcaJobManager::new(Arc::clone(&store));

    let job = manager
        .create_job(input("0xAB", "1 day"), ScheduleOptions::Unscheduled)
        .await
        .unwrap();
    assert!(job.next_run_at.is_none());

    let claimed = store
        .claim_due(chrono::Utc::now(), std::time::Duration::from_secs(60), 10)
        .await
        .unwrap();
    assert!(claimed.is_empty());
}

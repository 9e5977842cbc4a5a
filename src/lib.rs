//! dca - Recurring dollar-cost-average swap schedules, one per wallet.
//!
//! The [`DcaJobManager`] owns the schedule lifecycle over a pluggable
//! [`JobStore`]; the [`Dispatcher`] fires due jobs and the [`api`] module
//! exposes the lifecycle over HTTP.

pub mod api;
pub mod config;
pub mod core;
pub mod manager;
pub mod scheduler;
pub mod storage;

pub use config::{ConfigError, ServiceConfig, YamlLoader};
pub use core::job::{DCA_SWAP_JOB_NAME, DcaJobInput, DcaJobParams, FinishedRun, Job, JobFilter};
pub use core::schedule::{Schedule, ScheduleError};
pub use core::types::{AppVersion, InvalidWalletAddress, ScheduleId, WalletAddress};
pub use manager::{DcaJobManager, FindJobParams, ManagerError, ScheduleOptions};
pub use scheduler::{
    Dispatcher, DispatcherError, DispatcherHandle, DispatcherState, DryRunExecutor, ExecutorError,
    SwapExecutor, SwapReceipt,
};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStorage;
pub use storage::{
    InMemoryStorage, JobStore, PurchaseRecord, PurchaseStatus, StorageError, UniqueConflict,
};

//! Swap execution seam.
//!
//! The dispatcher hands each due job to a [`SwapExecutor`]; the outcome is
//! recorded as purchase history and applied to the job's run bookkeeping.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::core::job::Job;

/// Result of a successful swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapReceipt {
    /// On-chain transaction hash, if a transaction was sent.
    pub tx_hash: Option<String>,
}

/// Errors returned by a swap execution.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The swap was attempted and failed.
    #[error("swap failed: {0}")]
    Failed(String),

    /// The swap did not finish within its lock lifetime.
    #[error("swap timed out after {0:?}")]
    Timeout(Duration),
}

/// Performs the purchase for one job run.
#[async_trait]
pub trait SwapExecutor: Send + Sync + 'static {
    async fn execute(&self, job: &Job) -> Result<SwapReceipt, ExecutorError>;
}

/// Executor that logs the intended swap and sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl SwapExecutor for DryRunExecutor {
    async fn execute(&self, job: &Job) -> Result<SwapReceipt, ExecutorError> {
        info!(
            schedule_id = %job.id,
            wallet_address = %job.data.wallet_address,
            interval = %job.data.purchase_interval_human,
            app_version = %job.data.vincent_app_version,
            params = %serde_json::Value::Object(job.data.params.clone()),
            "Dry run: would execute DCA swap"
        );
        Ok(SwapReceipt::default())
    }
}

//! Dispatcher engine implementation.
//!
//! The dispatcher is responsible for:
//! - Claiming due jobs from the store on every tick
//! - Executing swaps with bounded concurrency
//! - Recording purchase history and run bookkeeping
//! - Pause, resume and graceful shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::core::job::{FinishedRun, Job, now_millis};
use crate::core::types::ScheduleId;
use crate::storage::{JobStore, PurchaseRecord};

use super::executor::{ExecutorError, SwapExecutor};
use super::handle::{COMMAND_CHANNEL_BUFFER, DispatcherHandle};
use super::types::{DispatcherCommand, DispatcherError, DispatcherState};

/// Dispatcher that fires due DCA jobs.
pub struct Dispatcher<S: JobStore, E: SwapExecutor> {
    /// Job store.
    store: Arc<S>,
    /// Swap executor.
    executor: Arc<E>,
    /// Tick interval for claiming due jobs.
    tick_interval: Duration,
    /// How long a claim holds a job; also bounds each execution.
    lock_lifetime: Duration,
    /// Maximum jobs claimed per tick.
    batch_size: usize,
    /// Limits concurrent swap executions.
    permits: Arc<Semaphore>,
    /// In-flight executions.
    running: Arc<RwLock<HashMap<ScheduleId, JoinHandle<()>>>>,
    /// Graceful shutdown timeout (default: 30 seconds).
    shutdown_timeout: Duration,
}

impl<S: JobStore + 'static, E: SwapExecutor> Dispatcher<S, E> {
    /// Create a new dispatcher over a shared store.
    pub fn new(store: Arc<S>, executor: E) -> Self {
        Self {
            store,
            executor: Arc::new(executor),
            tick_interval: Duration::from_secs(5),
            lock_lifetime: Duration::from_secs(600),
            batch_size: 16,
            permits: Arc::new(Semaphore::new(4)),
            running: Arc::new(RwLock::new(HashMap::new())),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the lock lifetime.
    pub fn with_lock_lifetime(mut self, lifetime: Duration) -> Self {
        self.lock_lifetime = lifetime;
        self
    }

    /// Set the maximum number of jobs claimed per tick.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the maximum number of concurrent swap executions.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Start the dispatcher and return a handle for controlling it.
    pub fn start(self) -> (DispatcherHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(DispatcherState::Running));

        let handle = DispatcherHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, task)
    }

    async fn run(
        self,
        mut command_rx: mpsc::Receiver<DispatcherCommand>,
        state: Arc<RwLock<DispatcherState>>,
    ) {
        let start = tokio::time::Instant::now() + self.tick_interval;
        let mut interval = tokio::time::interval_at(start, self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            tick_interval = ?self.tick_interval,
            lock_lifetime = ?self.lock_lifetime,
            batch_size = self.batch_size,
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let current_state = *state.read().await;
                    if current_state == DispatcherState::Running {
                        if let Err(e) = self.dispatch_due().await {
                            tracing::error!(error = %e, "Failed to claim due DCA jobs");
                        }
                    }

                    self.cleanup_finished().await;
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        DispatcherCommand::Tick { response } => {
                            let result = self.dispatch_due().await;
                            let _ = response.send(result);
                        }
                        DispatcherCommand::Pause { response } => {
                            *state.write().await = DispatcherState::Paused;
                            tracing::info!("Dispatcher paused");
                            let _ = response.send(());
                        }
                        DispatcherCommand::Resume { response } => {
                            *state.write().await = DispatcherState::Running;
                            tracing::info!("Dispatcher resumed");
                            let _ = response.send(());
                        }
                        DispatcherCommand::Shutdown { response } => {
                            let mut s = state.write().await;
                            *s = DispatcherState::Stopped;
                            drop(s);

                            self.await_running().await;

                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Claim due jobs and spawn an execution for each.
    async fn dispatch_due(&self) -> Result<usize, DispatcherError> {
        self.cleanup_finished().await;

        let now = now_millis();
        let claimed = self
            .store
            .claim_due(now, self.lock_lifetime, self.batch_size)
            .await?;

        let mut running = self.running.write().await;
        let mut started = 0;
        for job in claimed {
            if running.contains_key(&job.id) {
                tracing::warn!(schedule_id = %job.id, "DCA job still executing, skipping");
                continue;
            }

            let id = job.id.clone();
            let handle = tokio::spawn(execute_job(
                Arc::clone(&self.store),
                Arc::clone(&self.executor),
                Arc::clone(&self.permits),
                self.lock_lifetime,
                job,
            ));
            running.insert(id, handle);
            started += 1;
        }

        if started > 0 {
            tracing::debug!(started, "Dispatched due DCA jobs");
        }
        Ok(started)
    }

    /// Clean up finished execution handles.
    async fn cleanup_finished(&self) {
        let mut running = self.running.write().await;
        running.retain(|_, handle| !handle.is_finished());
    }

    /// Wait for in-flight executions to complete with a timeout.
    async fn await_running(&self) {
        let running_count = self.running.read().await.len();

        if running_count == 0 {
            tracing::info!("No in-flight swaps to wait for during shutdown");
            return;
        }

        tracing::info!(
            "Graceful shutdown: waiting for {} in-flight swap(s) (timeout: {:?})",
            running_count,
            self.shutdown_timeout
        );

        let start = tokio::time::Instant::now();
        let deadline = start + self.shutdown_timeout;

        loop {
            let mut running = self.running.write().await;
            running.retain(|_, handle| !handle.is_finished());
            let remaining = running.len();
            drop(running);

            if remaining == 0 {
                tracing::info!("All in-flight swaps completed in {:?}", start.elapsed());
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "Graceful shutdown timeout ({:?}) exceeded with {} swap(s) still running",
                    self.shutdown_timeout,
                    remaining
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Execute one claimed job and persist its outcome.
async fn execute_job<S: JobStore, E: SwapExecutor>(
    store: Arc<S>,
    executor: Arc<E>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    job: Job,
) {
    let Ok(_permit) = permits.acquire_owned().await else {
        return;
    };

    let started_at = now_millis();
    tracing::info!(
        schedule_id = %job.id,
        wallet_address = %job.data.wallet_address,
        "Executing DCA swap"
    );

    let outcome = match tokio::time::timeout(timeout, executor.execute(&job)).await {
        Ok(result) => result,
        Err(_) => Err(ExecutorError::Timeout(timeout)),
    };
    let finished_at = now_millis();

    let (purchase, error) = match outcome {
        Ok(receipt) => {
            tracing::info!(
                schedule_id = %job.id,
                tx_hash = receipt.tx_hash.as_deref().unwrap_or("-"),
                "DCA swap succeeded"
            );
            (PurchaseRecord::succeeded(&job, receipt.tx_hash, finished_at), None)
        }
        Err(e) => {
            tracing::warn!(schedule_id = %job.id, error = %e, "DCA swap failed");
            let reason = e.to_string();
            (PurchaseRecord::failed(&job, reason.clone(), finished_at), Some(reason))
        }
    };

    if let Err(e) = store.record_purchase(purchase).await {
        tracing::error!(schedule_id = %job.id, error = %e, "Failed to record purchase");
    }

    let run = FinishedRun {
        id: job.id.clone(),
        started_at,
        finished_at,
        error,
    };
    match store.finish_run(run).await {
        Ok(Some(updated)) => {
            tracing::debug!(schedule_id = %updated.id, next_run_at = ?updated.next_run_at, "DCA job rescheduled");
        }
        Ok(None) => {
            tracing::debug!(schedule_id = %job.id, "DCA job canceled during execution");
        }
        Err(e) => {
            tracing::error!(schedule_id = %job.id, error = %e, "Failed to finish DCA job run");
        }
    }
}

//! Control handle for a running dispatcher.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};

use super::types::{DispatcherCommand, DispatcherError, DispatcherState};

/// Buffer size for the command channel between handle and dispatcher loop.
pub(crate) const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Cloneable handle to a dispatcher started with
/// [`Dispatcher::start`](super::Dispatcher::start).
#[derive(Clone)]
pub struct DispatcherHandle {
    pub(crate) command_tx: mpsc::Sender<DispatcherCommand>,
    pub(crate) state: Arc<RwLock<DispatcherState>>,
}

impl DispatcherHandle {
    /// Send a command to the loop and wait for its reply.
    async fn request<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> DispatcherCommand,
        operation: &str,
    ) -> Result<T, DispatcherError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                DispatcherError::ChannelError(format!("dispatcher stopped before {}", operation))
            })?;

        response_rx.await.map_err(|_| {
            DispatcherError::ChannelError(format!("no reply to {}", operation))
        })
    }

    /// Claim and dispatch due jobs now, even while paused.
    ///
    /// Returns the number of executions started.
    pub async fn tick_now(&self) -> Result<usize, DispatcherError> {
        self.request(|response| DispatcherCommand::Tick { response }, "tick")
            .await?
    }

    /// Stop claiming due jobs on periodic ticks. In-flight swaps finish.
    pub async fn pause(&self) -> Result<(), DispatcherError> {
        self.request(|response| DispatcherCommand::Pause { response }, "pause")
            .await
    }

    pub async fn resume(&self) -> Result<(), DispatcherError> {
        self.request(|response| DispatcherCommand::Resume { response }, "resume")
            .await
    }

    /// Stop the loop once in-flight swaps finish or the shutdown timeout
    /// passes.
    pub async fn shutdown(&self) -> Result<(), DispatcherError> {
        self.request(|response| DispatcherCommand::Shutdown { response }, "shutdown")
            .await
    }

    pub async fn state(&self) -> DispatcherState {
        *self.state.read().await
    }
}

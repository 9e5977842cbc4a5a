//! Dispatcher type definitions.
//!
//! This module contains error types, state enums, and command types for the dispatcher.

use crate::storage::StorageError;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur in the dispatcher.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Dispatcher is stopped.
    Stopped,
    /// Dispatcher is running.
    Running,
    /// Dispatcher is paused; due jobs wait until it resumes.
    Paused,
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatcherState::Stopped => "stopped",
            DispatcherState::Running => "running",
            DispatcherState::Paused => "paused",
        }
    }
}

/// Commands that can be sent to the dispatcher.
pub(crate) enum DispatcherCommand {
    /// Claim and dispatch due jobs now, returning how many were started.
    Tick {
        response: oneshot::Sender<Result<usize, DispatcherError>>,
    },
    /// Pause the dispatcher.
    Pause { response: oneshot::Sender<()> },
    /// Resume the dispatcher.
    Resume { response: oneshot::Sender<()> },
    /// Shutdown the dispatcher.
    Shutdown { response: oneshot::Sender<()> },
}

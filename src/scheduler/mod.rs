//! Dispatcher for due DCA jobs.
//!
//! This module provides the tick loop that claims due jobs from the store,
//! executes their swaps and records the outcome.

mod engine;
mod executor;
mod handle;
mod types;

pub use engine::Dispatcher;
pub use executor::{DryRunExecutor, ExecutorError, SwapExecutor, SwapReceipt};
pub use handle::DispatcherHandle;
pub use types::{DispatcherError, DispatcherState};

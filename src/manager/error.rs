//! Error types for the job lifecycle manager.

use thiserror::Error;

use crate::core::schedule::ScheduleError;
use crate::core::types::ScheduleId;
use crate::storage::StorageError;

/// Errors returned by [`DcaJobManager`](super::DcaJobManager) operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No job with this id is owned by the caller.
    #[error("No DCA schedule found with ID {0}")]
    NotFound(ScheduleId),

    /// More than one stored job matched a single id.
    #[error("found {count} DCA schedules with ID {schedule_id}")]
    Integrity { schedule_id: ScheduleId, count: usize },

    /// The job store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The interval or schedule could not be parsed.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),
}

impl ManagerError {
    /// Whether this error means the schedule does not exist for the caller.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ManagerError::NotFound(_))
    }
}

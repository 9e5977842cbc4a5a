//! Core domain types: identifiers, schedules and the DCA job record.

pub mod job;
pub mod schedule;
pub mod types;

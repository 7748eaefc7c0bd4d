//! Core domain types and traits for docket.
//!
//! This crate contains:
//! - Job definitions
//! - Executor and backend traits, execution results
//! - Cron schedules
//! - Output rendering

pub mod error;
pub mod executor;
pub mod job;
pub mod output;
pub mod schedule;

pub use error::{Error, PollFailure, Result};
pub use executor::{Backend, ExecutionResult, ExecutionStatus, Executor};
pub use job::{DEFAULT_TAG, JobDefinition, JobKind};
pub use schedule::CronSchedule;

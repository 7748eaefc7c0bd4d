//! Error types for docket.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("image pull failed: {0}")]
    PullFailed(String),

    #[error("create failed: {0}")]
    CreateFailed(String),

    #[error("start failed: {0}")]
    StartFailed(String),

    #[error("wait failed: {0}")]
    WaitFailed(String),

    #[error("poll failed: {0}")]
    PollFailed(#[from] PollFailure),

    #[error("log read failed: {0}")]
    LogReadFailed(String),

    #[error("cleanup failed: {0}")]
    CleanupFailed(String),

    #[error("unsupported job kind: {0}")]
    UnsupportedKind(String),

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cancelled")]
    Cancelled,
}

/// Ways the swarm task poll can end without a completed task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollFailure {
    #[error("service failed")]
    Failed { message: Option<String> },

    #[error("service rejected")]
    Rejected { message: Option<String> },

    #[error("unable to inspect tasks for service {service_id}")]
    TaskCount { service_id: String, count: usize },

    #[error("unable to inspect tasks for service {service_id}: {reason}")]
    Inspect { service_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

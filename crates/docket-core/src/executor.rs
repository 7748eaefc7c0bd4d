//! Executor traits and execution results.
//!
//! A [`Backend`] runs a job on one substrate (a plain container or a swarm
//! service). An [`Executor`] is what the triggers call: it picks the backend
//! for a job and returns whatever the backend produced.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::job::{JobDefinition, JobKind};
use crate::output::render_lines;
use crate::Result;

/// Terminal status of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed(String),
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Succeeded)
    }
}

/// Output and status of a finished execution.
///
/// Carries no job identity; callers attach the name and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Combined stdout and stderr, in the order the engine delivered it.
    pub output: Bytes,
    pub status: ExecutionStatus,
}

impl ExecutionResult {
    pub fn succeeded(output: impl Into<Bytes>) -> Self {
        Self {
            output: output.into(),
            status: ExecutionStatus::Succeeded,
        }
    }

    pub fn failed(output: impl Into<Bytes>, reason: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            status: ExecutionStatus::Failed(reason.into()),
        }
    }

    /// Output as printable lines.
    pub fn lines(&self) -> Vec<String> {
        render_lines(&self.output)
    }
}

/// Runs a job to completion on one kind of substrate.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of this backend.
    fn name(&self) -> &'static str;

    /// The job kind this backend handles.
    fn kind(&self) -> JobKind;

    /// Run the job, capture its output and remove whatever was created.
    async fn run(&self, job: &JobDefinition, cancel: &CancellationToken)
    -> Result<ExecutionResult>;
}

/// Executes jobs of any kind.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        job: &JobDefinition,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult>;
}

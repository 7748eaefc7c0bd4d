//! Polling a swarm service until its task finishes.

use bollard::models::{Task, TaskState};
use docket_core::{Error, PollFailure, Result};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::EngineClient;

/// What one inspection of a service's tasks showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskProgress {
    /// The task has not reached a terminal state yet.
    Pending,
    /// The task ran to completion.
    Complete,
}

/// Classify the tasks reported for a service.
///
/// Exactly one task is expected; any other count is a failure rather than
/// something to wait out. Engine states that end a task without completing
/// it (shutdown, remove, orphaned) count as failed.
pub fn classify_tasks(
    service_id: &str,
    tasks: &[Task],
) -> std::result::Result<TaskProgress, PollFailure> {
    let [task] = tasks else {
        return Err(PollFailure::TaskCount {
            service_id: service_id.to_string(),
            count: tasks.len(),
        });
    };

    let status = task.status.as_ref();
    let message = status.and_then(|s| s.err.clone().or_else(|| s.message.clone()));

    match status.and_then(|s| s.state.as_ref()) {
        Some(TaskState::COMPLETE) => Ok(TaskProgress::Complete),
        Some(TaskState::FAILED) => Err(PollFailure::Failed { message }),
        Some(TaskState::REJECTED) => Err(PollFailure::Rejected { message }),
        Some(TaskState::SHUTDOWN | TaskState::REMOVE | TaskState::ORPHANED) => {
            Err(PollFailure::Failed { message })
        }
        _ => Ok(TaskProgress::Pending),
    }
}

/// Periodically inspects a service's task until it is terminal.
pub struct TaskCompletionPoller<'a> {
    client: &'a dyn EngineClient,
    interval: Duration,
}

impl<'a> TaskCompletionPoller<'a> {
    pub fn new(client: &'a dyn EngineClient, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// Poll until the task completes, fails, is rejected, or `cancel` fires.
    ///
    /// The first inspection happens immediately. There is no deadline of
    /// its own; bound it through `cancel`.
    pub async fn wait_for_completion(
        &self,
        service_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = ticker.tick() => {}
            }

            let tasks = self.client.list_tasks(service_id).await?;
            match classify_tasks(service_id, &tasks)? {
                TaskProgress::Complete => return Ok(()),
                TaskProgress::Pending => {
                    debug!(service = %service_id, "Task still pending");
                }
            }
        }
    }
}

//! Dispatching jobs to the backend for their kind.

use async_trait::async_trait;
use docket_core::{Backend, Error, ExecutionResult, Executor, JobDefinition, JobKind, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::EngineClient;
use crate::container::ContainerRunBackend;
use crate::service::ClusteredServiceBackend;

/// Routes each job to the backend registered for its kind.
///
/// Holds no per-execution state, so one engine can run any number of jobs
/// at once.
pub struct JobExecutionEngine {
    backends: HashMap<JobKind, Arc<dyn Backend>>,
}

impl JobExecutionEngine {
    /// Engine with the container and service backends over `client`.
    pub fn new(client: Arc<dyn EngineClient>, poll_interval: Duration) -> Self {
        Self::from_backends([
            Arc::new(ContainerRunBackend::new(client.clone())) as Arc<dyn Backend>,
            Arc::new(ClusteredServiceBackend::new(client, poll_interval)),
        ])
    }

    /// Engine with exactly the given backends. A later backend for the same
    /// kind replaces an earlier one.
    pub fn from_backends(backends: impl IntoIterator<Item = Arc<dyn Backend>>) -> Self {
        let backends = backends
            .into_iter()
            .map(|backend| (backend.kind(), backend))
            .collect();
        Self { backends }
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    pub fn supports(&self, kind: JobKind) -> bool {
        self.backends.contains_key(&kind)
    }
}

#[async_trait]
impl Executor for JobExecutionEngine {
    async fn execute(
        &self,
        job: &JobDefinition,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let backend = self
            .backends
            .get(&job.kind)
            .ok_or_else(|| Error::UnsupportedKind(job.kind.to_string()))?;

        debug!(job = %job.name, backend = backend.name(), "Dispatching job");
        let result = backend.run(job, cancel).await;

        match &result {
            Ok(r) if r.status.is_success() => info!(job = %job.name, "Job succeeded"),
            Ok(r) => info!(job = %job.name, status = ?r.status, "Job finished unsuccessfully"),
            Err(e) => warn!(job = %job.name, error = %e, "Job execution failed"),
        }

        result
    }
}

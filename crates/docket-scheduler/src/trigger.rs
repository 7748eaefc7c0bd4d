//! Running exposed jobs on request.

use chrono::{DateTime, Utc};
use docket_core::{Error, ExecutionStatus, Executor, JobDefinition, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::clock::{Clock, SystemClock};

/// Outcome of one on-demand run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub job_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    /// Printable output lines.
    pub output: Vec<String>,
}

/// Runs externally triggerable jobs by name.
///
/// Runs are not serialized against the scheduler or each other; the same
/// job can be running several times at once.
pub struct OnDemandTrigger {
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    routes: BTreeMap<String, Arc<JobDefinition>>,
}

impl OnDemandTrigger {
    /// Routing table of the jobs in `jobs` flagged as externally triggerable.
    pub fn new(executor: Arc<dyn Executor>, jobs: impl IntoIterator<Item = JobDefinition>) -> Self {
        let routes = jobs
            .into_iter()
            .filter(|job| job.externally_triggerable)
            .map(|job| (job.name.clone(), Arc::new(job)))
            .collect();

        Self {
            executor,
            clock: Arc::new(SystemClock),
            routes,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Exposed job names, sorted.
    pub fn job_names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Run `name` once and wait for it to finish.
    pub async fn run_now(&self, name: &str, cancel: &CancellationToken) -> Result<RunReport> {
        let job = self
            .routes
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("job {}", name)))?;

        let start_time = self.clock.now();
        info!(job = %job.name, "Running job on demand");
        let result = self.executor.execute(job, cancel).await?;
        let end_time = self.clock.now();

        Ok(RunReport {
            job_name: job.name.clone(),
            start_time,
            end_time,
            output: result.lines(),
            status: result.status,
        })
    }
}

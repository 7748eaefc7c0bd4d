//! The container engine calls the backends depend on.

use async_trait::async_trait;
use bollard::models::{ServiceSpec, Task};
use bytes::Bytes;
use docket_core::{JobDefinition, Result};
use std::collections::BTreeMap;

/// Label attached to every container and service docket creates.
pub const JOB_LABEL: &str = "docket.job";

/// What to create for a single-run job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRequest {
    /// `image:tag` reference.
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl ContainerRequest {
    pub fn for_job(job: &JobDefinition) -> Self {
        Self {
            image: job.image_reference(),
            command: job.command.clone(),
            env: job.environment.clone(),
            labels: job_labels(job),
        }
    }
}

pub(crate) fn job_labels(job: &JobDefinition) -> BTreeMap<String, String> {
    BTreeMap::from([(JOB_LABEL.to_string(), job.name.clone())])
}

/// Lifecycle calls against a container engine.
///
/// Each method maps engine failures onto the matching [`docket_core::Error`]
/// variant, so backends can propagate them with `?`.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Ids of local images matching `reference` exactly.
    async fn list_images(&self, reference: &str) -> Result<Vec<String>>;

    /// Pull an image, draining progress until the engine reports the end.
    async fn pull_image(&self, image: &str, tag: &str) -> Result<()>;

    /// Create a container and return its id.
    async fn create_container(&self, request: ContainerRequest) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Block until the container is no longer running and return its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Full stdout and stderr of a container.
    async fn container_logs(&self, id: &str) -> Result<Bytes>;

    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Resolve a swarm secret name to its id.
    async fn secret_id(&self, name: &str) -> Result<String>;

    /// Resolve a swarm config name to its id.
    async fn config_id(&self, name: &str) -> Result<String>;

    /// Create a service and return its id.
    async fn create_service(&self, spec: ServiceSpec) -> Result<String>;

    /// Tasks currently recorded for a service.
    async fn list_tasks(&self, service_id: &str) -> Result<Vec<Task>>;

    /// Full output of a service's task.
    async fn service_logs(&self, service_id: &str) -> Result<Bytes>;

    async fn remove_service(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::JobKind;

    #[test]
    fn test_container_request_from_job() {
        let mut job = JobDefinition::new("backup", JobKind::SingleRun, "alpine");
        job.tag = "3.20".to_string();
        job.command = vec!["echo".to_string(), "hi".to_string()];
        job.environment = vec!["FOO=bar".to_string()];

        let request = ContainerRequest::for_job(&job);
        assert_eq!(request.image, "alpine:3.20");
        assert_eq!(request.command, vec!["echo", "hi"]);
        assert_eq!(request.env, vec!["FOO=bar"]);
        assert_eq!(request.labels.get(JOB_LABEL), Some(&"backup".to_string()));
    }
}

//! Docker engine client backed by bollard.

use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ServiceSpec, Task};
use bollard::query_parameters::{
    CreateImageOptionsBuilder, ListImagesOptionsBuilder, ListTasksOptionsBuilder, LogsOptions,
    LogsOptionsBuilder, RemoveContainerOptionsBuilder, WaitContainerOptionsBuilder,
};
use bytes::{Bytes, BytesMut};
use docket_core::{Error, PollFailure, Result};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::client::{ContainerRequest, EngineClient};

/// Engine client talking to a Docker daemon (standalone or swarm manager).
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect using the local defaults (`DOCKER_HOST` or the local socket)
    /// and check that the daemon answers.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::EngineUnavailable(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| Error::EngineUnavailable(e.to_string()))?;
        info!("Connected to Docker engine");
        Ok(Self { docker })
    }

    /// Create with a custom Docker client.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn log_options() -> LogsOptions {
    LogsOptionsBuilder::new()
        .follow(false)
        .stdout(true)
        .stderr(true)
        .build()
}

/// Drain a log stream into one buffer, in the order the engine sent it.
async fn collect_logs(
    stream: impl Stream<Item = std::result::Result<bollard::container::LogOutput, BollardError>>,
    source: &str,
) -> Result<Bytes> {
    let mut stream = std::pin::pin!(stream);
    let mut output = BytesMut::new();
    while let Some(result) = stream.next().await {
        let chunk = result
            .map_err(|e| Error::LogReadFailed(format!("Failed to read logs of {}: {}", source, e)))?;
        output.extend_from_slice(&chunk.into_bytes());
    }
    Ok(output.freeze())
}

#[async_trait]
impl EngineClient for DockerClient {
    async fn list_images(&self, reference: &str) -> Result<Vec<String>> {
        let filters = HashMap::from([("reference", vec![reference])]);
        let options = ListImagesOptionsBuilder::new().filters(&filters).build();

        let images = self
            .docker
            .list_images(Some(options))
            .await
            .map_err(|e| Error::EngineUnavailable(format!("Failed to list images: {}", e)))?;

        Ok(images.into_iter().map(|image| image.id).collect())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<()> {
        let options = CreateImageOptionsBuilder::new()
            .from_image(image)
            .tag(tag)
            .build();

        let mut pull_stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = pull_stream.next().await {
            let info = result
                .map_err(|e| Error::PullFailed(format!("{}:{}: {}", image, tag, e)))?;
            if let Some(detail) = info.error_detail {
                let message = detail.message.unwrap_or_else(|| "unknown error".to_string());
                return Err(Error::PullFailed(format!("{}:{}: {}", image, tag, message)));
            }
            if let Some(status) = info.status {
                debug!(status = %status, "Pull progress");
            }
        }

        Ok(())
    }

    async fn create_container(&self, request: ContainerRequest) -> Result<String> {
        let body = ContainerCreateBody {
            image: Some(request.image),
            cmd: if request.command.is_empty() {
                None
            } else {
                Some(request.command)
            },
            env: Some(request.env),
            labels: Some(request.labels.into_iter().collect::<HashMap<_, _>>()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let container = self
            .docker
            .create_container(None, body)
            .await
            .map_err(|e| Error::CreateFailed(format!("Failed to create container: {}", e)))?;

        Ok(container.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None)
            .await
            .map_err(|e| Error::StartFailed(format!("Failed to start container {}: {}", id, e)))
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptionsBuilder::new()
            .condition("not-running")
            .build();

        let mut stream = self.docker.wait_container(id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a nonzero exit as an error carrying the code
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::WaitFailed(format!(
                "Failed to wait for container {}: {}",
                id, e
            ))),
            None => Err(Error::WaitFailed(format!(
                "No exit status reported for container {}",
                id
            ))),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<Bytes> {
        collect_logs(self.docker.logs(id, Some(log_options())), id).await
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptionsBuilder::new().force(true).build();

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| Error::CleanupFailed(format!("Failed to remove container {}: {}", id, e)))
    }

    async fn secret_id(&self, name: &str) -> Result<String> {
        let secret = self
            .docker
            .inspect_secret(name)
            .await
            .map_err(|e| Error::CreateFailed(format!("Unknown secret {}: {}", name, e)))?;
        secret
            .id
            .ok_or_else(|| Error::CreateFailed(format!("Secret {} has no id", name)))
    }

    async fn config_id(&self, name: &str) -> Result<String> {
        let config = self
            .docker
            .inspect_config(name)
            .await
            .map_err(|e| Error::CreateFailed(format!("Unknown config {}: {}", name, e)))?;
        config
            .id
            .ok_or_else(|| Error::CreateFailed(format!("Config {} has no id", name)))
    }

    async fn create_service(&self, spec: ServiceSpec) -> Result<String> {
        let response = self
            .docker
            .create_service(spec, None)
            .await
            .map_err(|e| Error::CreateFailed(format!("Failed to create service: {}", e)))?;

        response
            .id
            .ok_or_else(|| Error::CreateFailed("Engine returned no service id".to_string()))
    }

    async fn list_tasks(&self, service_id: &str) -> Result<Vec<Task>> {
        let filters = HashMap::from([("service", vec![service_id])]);
        let options = ListTasksOptionsBuilder::new().filters(&filters).build();

        self.docker.list_tasks(Some(options)).await.map_err(|e| {
            PollFailure::Inspect {
                service_id: service_id.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Logs are gathered by the swarm from whichever node ran the task.
    async fn service_logs(&self, service_id: &str) -> Result<Bytes> {
        collect_logs(
            self.docker.service_logs(service_id, Some(log_options())),
            service_id,
        )
        .await
    }

    async fn remove_service(&self, id: &str) -> Result<()> {
        self.docker
            .delete_service(id)
            .await
            .map_err(|e| Error::CleanupFailed(format!("Failed to remove service {}: {}", id, e)))
    }
}

/// Integration tests that require Docker to be running.
/// Run with: cargo test -- --ignored
#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    #[ignore]
    async fn test_connect() {
        let client = DockerClient::connect().await;
        assert!(client.is_ok(), "Should connect to Docker daemon");
    }

    #[tokio::test]
    #[ignore]
    async fn test_container_lifecycle() {
        let client = DockerClient::connect().await.unwrap();
        client.pull_image("alpine", "latest").await.unwrap();
        assert!(!client.list_images("alpine:latest").await.unwrap().is_empty());

        let id = client
            .create_container(ContainerRequest {
                image: "alpine:latest".to_string(),
                command: vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    "echo out; echo err >&2; exit 3".to_string(),
                ],
                env: vec![],
                labels: BTreeMap::new(),
            })
            .await
            .unwrap();

        client.start_container(&id).await.unwrap();
        assert_eq!(client.wait_container(&id).await.unwrap(), 3);

        let logs = client.container_logs(&id).await.unwrap();
        let text = String::from_utf8_lossy(&logs);
        assert!(text.contains("out"));
        assert!(text.contains("err"));

        client.remove_container(&id).await.unwrap();
    }

    /// Needs a daemon that is a swarm manager (`docker swarm init`).
    #[tokio::test]
    #[ignore]
    async fn test_service_tasks_and_logs() {
        use crate::poller::{TaskProgress, classify_tasks};
        use crate::service::build_service_spec;
        use docket_core::{JobDefinition, JobKind};
        use std::time::Duration;

        let client = DockerClient::connect().await.unwrap();
        let mut job = JobDefinition::new("docket-it-swarm", JobKind::ClusteredService, "busybox");
        job.command = vec!["echo".to_string(), "from swarm".to_string()];

        let service_id = client
            .create_service(build_service_spec(&job, &[], &[]))
            .await
            .unwrap();

        let mut complete = false;
        for _ in 0..120 {
            let tasks = client.list_tasks(&service_id).await.unwrap();
            // the task can take a moment to be listed at all
            if !tasks.is_empty() {
                match classify_tasks(&service_id, &tasks) {
                    Ok(TaskProgress::Complete) => {
                        complete = true;
                        break;
                    }
                    Ok(TaskProgress::Pending) => {}
                    Err(e) => panic!("task did not complete: {}", e),
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        let logs = client.service_logs(&service_id).await;
        client.remove_service(&service_id).await.unwrap();

        assert!(complete, "task never completed");
        let logs = logs.unwrap();
        assert!(String::from_utf8_lossy(&logs).contains("from swarm"));
    }
}

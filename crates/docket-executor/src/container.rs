//! Single-run backend: one ephemeral container per execution.

use async_trait::async_trait;
use docket_core::{Backend, Error, ExecutionResult, JobDefinition, JobKind, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{ContainerRequest, EngineClient};
use crate::image::ImageResolver;

/// Runs a job as a container on the engine's node.
///
/// The exit code decides the status: zero is `Succeeded`, anything else is
/// `Failed` with the output still attached. Removal after the run is best
/// effort and never replaces the run's own result.
pub struct ContainerRunBackend {
    client: Arc<dyn EngineClient>,
    images: ImageResolver,
}

impl ContainerRunBackend {
    pub fn new(client: Arc<dyn EngineClient>) -> Self {
        let images = ImageResolver::new(client.clone());
        Self { client, images }
    }

    async fn run_created(&self, id: &str, cancel: &CancellationToken) -> Result<ExecutionResult> {
        info!(container = %id, "Starting container");
        self.client.start_container(id).await?;

        let exit_code = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            code = self.client.wait_container(id) => code?,
        };
        info!(container = %id, exit_code, "Container exited");

        let output = self.client.container_logs(id).await?;

        Ok(if exit_code == 0 {
            ExecutionResult::succeeded(output)
        } else {
            ExecutionResult::failed(output, format!("exited with code {}", exit_code))
        })
    }
}

#[async_trait]
impl Backend for ContainerRunBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    fn kind(&self) -> JobKind {
        JobKind::SingleRun
    }

    async fn run(
        &self,
        job: &JobDefinition,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        self.images.ensure_image(&job.image, &job.tag).await?;

        info!(job = %job.name, image = %job.image_reference(), "Creating container");
        let id = self
            .client
            .create_container(ContainerRequest::for_job(job))
            .await?;

        let outcome = self.run_created(&id, cancel).await;

        if let Err(e) = self.client.remove_container(&id).await {
            warn!(job = %job.name, container = %id, error = %e, "Failed to remove container");
        }

        outcome
    }
}

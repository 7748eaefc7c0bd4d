//! Clustered backend: a one-replica swarm service per execution.

use async_trait::async_trait;
use bollard::models::{
    ServiceSpec, ServiceSpecMode, ServiceSpecModeReplicated, TaskSpec, TaskSpecContainerSpec,
    TaskSpecContainerSpecConfigs, TaskSpecContainerSpecSecrets, TaskSpecPlacement,
    TaskSpecPlacementPreferences, TaskSpecPlacementSpread, TaskSpecRestartPolicy,
    TaskSpecRestartPolicyConditionEnum,
};
use docket_core::{Backend, ExecutionResult, JobDefinition, JobKind, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{EngineClient, job_labels};
use crate::poller::TaskCompletionPoller;

/// A secret or config name paired with the id the engine knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub name: String,
    pub id: String,
}

/// Placement built from a job's constraints and spread preferences.
pub fn build_placement(job: &JobDefinition) -> TaskSpecPlacement {
    let preferences = job
        .placement_preferences
        .iter()
        .map(|descriptor| TaskSpecPlacementPreferences {
            spread: Some(TaskSpecPlacementSpread {
                spread_descriptor: Some(descriptor.clone()),
            }),
        })
        .collect();

    TaskSpecPlacement {
        constraints: Some(job.constraints.clone()),
        preferences: Some(preferences),
        ..Default::default()
    }
}

/// Service spec for one run of `job`: a single replica that is never restarted.
pub fn build_service_spec(
    job: &JobDefinition,
    secrets: &[ResolvedRef],
    configs: &[ResolvedRef],
) -> ServiceSpec {
    let secrets = secrets
        .iter()
        .map(|secret| {
            let mut entry = TaskSpecContainerSpecSecrets {
                secret_id: Some(secret.id.clone()),
                secret_name: Some(secret.name.clone()),
                ..Default::default()
            };
            let file = entry.file.get_or_insert_with(Default::default);
            file.name = Some(secret.name.clone());
            file.uid = Some("0".to_string());
            file.gid = Some("0".to_string());
            file.mode = Some(0o444);
            entry
        })
        .collect();

    let configs = configs
        .iter()
        .map(|config| {
            let mut entry = TaskSpecContainerSpecConfigs {
                config_id: Some(config.id.clone()),
                config_name: Some(config.name.clone()),
                ..Default::default()
            };
            let file = entry.file.get_or_insert_with(Default::default);
            file.name = Some(format!("/{}", config.name));
            file.uid = Some("0".to_string());
            file.gid = Some("0".to_string());
            file.mode = Some(0o444);
            entry
        })
        .collect();

    let container_spec = TaskSpecContainerSpec {
        image: Some(job.image_reference()),
        command: if job.command.is_empty() {
            None
        } else {
            Some(job.command.clone())
        },
        env: Some(job.environment.clone()),
        secrets: Some(secrets),
        configs: Some(configs),
        ..Default::default()
    };

    ServiceSpec {
        labels: Some(job_labels(job).into_iter().collect()),
        mode: Some(ServiceSpecMode {
            replicated: Some(ServiceSpecModeReplicated { replicas: Some(1) }),
            ..Default::default()
        }),
        task_template: Some(TaskSpec {
            container_spec: Some(container_spec),
            restart_policy: Some(TaskSpecRestartPolicy {
                condition: Some(TaskSpecRestartPolicyConditionEnum::NONE),
                ..Default::default()
            }),
            placement: Some(build_placement(job)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Runs a job as a swarm service and waits for its task to finish.
///
/// Removal after the run is best effort, the same as for containers.
pub struct ClusteredServiceBackend {
    client: Arc<dyn EngineClient>,
    poll_interval: Duration,
}

impl ClusteredServiceBackend {
    pub fn new(client: Arc<dyn EngineClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    async fn resolve(&self, job: &JobDefinition) -> Result<(Vec<ResolvedRef>, Vec<ResolvedRef>)> {
        let mut secrets = Vec::with_capacity(job.secrets.len());
        for name in &job.secrets {
            let id = self.client.secret_id(name).await?;
            secrets.push(ResolvedRef {
                name: name.clone(),
                id,
            });
        }

        let mut configs = Vec::with_capacity(job.configs.len());
        for name in &job.configs {
            let id = self.client.config_id(name).await?;
            configs.push(ResolvedRef {
                name: name.clone(),
                id,
            });
        }

        Ok((secrets, configs))
    }

    async fn run_created(
        &self,
        service_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        TaskCompletionPoller::new(self.client.as_ref(), self.poll_interval)
            .wait_for_completion(service_id, cancel)
            .await?;
        info!(service = %service_id, "Service task complete");

        let output = self.client.service_logs(service_id).await?;
        Ok(ExecutionResult::succeeded(output))
    }
}

#[async_trait]
impl Backend for ClusteredServiceBackend {
    fn name(&self) -> &'static str {
        "service"
    }

    fn kind(&self) -> JobKind {
        JobKind::ClusteredService
    }

    async fn run(
        &self,
        job: &JobDefinition,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult> {
        let (secrets, configs) = self.resolve(job).await?;
        let spec = build_service_spec(job, &secrets, &configs);

        info!(job = %job.name, image = %job.image_reference(), "Creating service");
        let service_id = self.client.create_service(spec).await?;

        let outcome = self.run_created(&service_id, cancel).await;

        if let Err(e) = self.client.remove_service(&service_id).await {
            warn!(job = %job.name, service = %service_id, error = %e, "Failed to remove service");
        }

        outcome
    }
}

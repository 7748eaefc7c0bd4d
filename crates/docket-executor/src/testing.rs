//! In-memory engine client for tests.
//!
//! [`FakeEngine`] records every call it receives and answers from a fixed
//! script: which images exist, what a container prints and exits with, and
//! which task lists successive polls observe.

use async_trait::async_trait;
use bollard::models::{ServiceSpec, Task, TaskState, TaskStatus};
use bytes::Bytes;
use docket_core::{Error, PollFailure, Result};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::client::{ContainerRequest, EngineClient};

/// A call observed by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ListImages(String),
    PullImage(String),
    CreateContainer(ContainerRequest),
    StartContainer(String),
    WaitContainer(String),
    ContainerLogs(String),
    RemoveContainer(String),
    SecretId(String),
    ConfigId(String),
    /// Carries the id handed back for the new service.
    CreateService(String),
    ListTasks(String),
    ServiceLogs(String),
    RemoveService(String),
}

/// Calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ListImages,
    PullImage,
    CreateContainer,
    StartContainer,
    WaitContainer,
    ContainerLogs,
    RemoveContainer,
    SecretId,
    ConfigId,
    CreateService,
    ListTasks,
    ServiceLogs,
    RemoveService,
}

/// A task in the given state.
pub fn task(state: TaskState) -> Task {
    Task {
        status: Some(TaskStatus {
            state: Some(state),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<EngineCall>,
    services: Vec<ServiceSpec>,
    next_id: usize,
    polls: usize,
}

/// Scripted, recording [`EngineClient`].
pub struct FakeEngine {
    images: Vec<String>,
    output: Bytes,
    exit_code: i64,
    task_polls: Vec<Vec<Task>>,
    failures: HashSet<FailPoint>,
    block_wait: bool,
    state: Mutex<FakeState>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    /// No local images, empty output, exit code 0, tasks complete on the first poll.
    pub fn new() -> Self {
        Self {
            images: Vec::new(),
            output: Bytes::new(),
            exit_code: 0,
            task_polls: vec![vec![task(TaskState::COMPLETE)]],
            failures: HashSet::new(),
            block_wait: false,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Report `reference` as present locally.
    pub fn with_image(mut self, reference: &str) -> Self {
        self.images.push(reference.to_string());
        self
    }

    /// Output returned for every container and service.
    pub fn with_output(mut self, output: impl Into<Bytes>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    /// One task per poll, in the given states; the last state repeats.
    pub fn with_task_states(mut self, states: Vec<TaskState>) -> Self {
        self.task_polls = states.into_iter().map(|s| vec![task(s)]).collect();
        self
    }

    /// Task lists returned by successive polls; the last list repeats.
    pub fn with_task_polls(mut self, polls: Vec<Vec<Task>>) -> Self {
        self.task_polls = polls;
        self
    }

    pub fn fail_on(mut self, point: FailPoint) -> Self {
        self.failures.insert(point);
        self
    }

    /// Make container waits never return.
    pub fn block_on_wait(mut self) -> Self {
        self.block_wait = true;
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn pull_count(&self) -> usize {
        self.count_calls(|c| matches!(c, EngineCall::PullImage(_)))
    }

    /// Ids of containers that were created.
    pub fn created_containers(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::StartContainer(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// Specs of services that were created.
    pub fn created_services(&self) -> Vec<ServiceSpec> {
        self.lock().services.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake engine state poisoned")
    }

    fn record(&self, call: EngineCall) {
        self.lock().calls.push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.lock();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.failures.contains(&point)
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn list_images(&self, reference: &str) -> Result<Vec<String>> {
        self.record(EngineCall::ListImages(reference.to_string()));
        if self.fails(FailPoint::ListImages) {
            return Err(Error::EngineUnavailable("connection refused".to_string()));
        }
        Ok(self
            .images
            .iter()
            .filter(|image| image.as_str() == reference)
            .enumerate()
            .map(|(i, _)| format!("sha256:{:064}", i))
            .collect())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> Result<()> {
        self.record(EngineCall::PullImage(format!("{}:{}", image, tag)));
        if self.fails(FailPoint::PullImage) {
            return Err(Error::PullFailed(format!("{}:{}: not found", image, tag)));
        }
        Ok(())
    }

    async fn create_container(&self, request: ContainerRequest) -> Result<String> {
        self.record(EngineCall::CreateContainer(request));
        if self.fails(FailPoint::CreateContainer) {
            return Err(Error::CreateFailed("no such image".to_string()));
        }
        Ok(self.next_id("container"))
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.record(EngineCall::StartContainer(id.to_string()));
        if self.fails(FailPoint::StartContainer) {
            return Err(Error::StartFailed(format!("cannot start {}", id)));
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        self.record(EngineCall::WaitContainer(id.to_string()));
        if self.block_wait {
            return std::future::pending::<Result<i64>>().await;
        }
        if self.fails(FailPoint::WaitContainer) {
            return Err(Error::WaitFailed(format!("lost {}", id)));
        }
        Ok(self.exit_code)
    }

    async fn container_logs(&self, id: &str) -> Result<Bytes> {
        self.record(EngineCall::ContainerLogs(id.to_string()));
        if self.fails(FailPoint::ContainerLogs) {
            return Err(Error::LogReadFailed(format!("no logs for {}", id)));
        }
        Ok(self.output.clone())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.record(EngineCall::RemoveContainer(id.to_string()));
        if self.fails(FailPoint::RemoveContainer) {
            return Err(Error::CleanupFailed(format!("cannot remove {}", id)));
        }
        Ok(())
    }

    async fn secret_id(&self, name: &str) -> Result<String> {
        self.record(EngineCall::SecretId(name.to_string()));
        if self.fails(FailPoint::SecretId) {
            return Err(Error::CreateFailed(format!("Unknown secret {}", name)));
        }
        Ok(format!("secret-id-{}", name))
    }

    async fn config_id(&self, name: &str) -> Result<String> {
        self.record(EngineCall::ConfigId(name.to_string()));
        if self.fails(FailPoint::ConfigId) {
            return Err(Error::CreateFailed(format!("Unknown config {}", name)));
        }
        Ok(format!("config-id-{}", name))
    }

    async fn create_service(&self, spec: ServiceSpec) -> Result<String> {
        if self.fails(FailPoint::CreateService) {
            self.record(EngineCall::CreateService(String::new()));
            return Err(Error::CreateFailed("swarm not initialised".to_string()));
        }
        let id = self.next_id("service");
        let mut state = self.lock();
        state.calls.push(EngineCall::CreateService(id.clone()));
        state.services.push(spec);
        Ok(id)
    }

    async fn list_tasks(&self, service_id: &str) -> Result<Vec<Task>> {
        let poll = {
            let mut state = self.lock();
            state.calls.push(EngineCall::ListTasks(service_id.to_string()));
            state.polls += 1;
            state.polls - 1
        };
        if self.fails(FailPoint::ListTasks) {
            return Err(PollFailure::Inspect {
                service_id: service_id.to_string(),
                reason: "engine gone".to_string(),
            }
            .into());
        }
        let index = poll.min(self.task_polls.len().saturating_sub(1));
        Ok(self.task_polls.get(index).cloned().unwrap_or_default())
    }

    async fn service_logs(&self, service_id: &str) -> Result<Bytes> {
        self.record(EngineCall::ServiceLogs(service_id.to_string()));
        if self.fails(FailPoint::ServiceLogs) {
            return Err(Error::LogReadFailed(format!("no logs for {}", service_id)));
        }
        Ok(self.output.clone())
    }

    async fn remove_service(&self, id: &str) -> Result<()> {
        self.record(EngineCall::RemoveService(id.to_string()));
        if self.fails(FailPoint::RemoveService) {
            return Err(Error::CleanupFailed(format!("cannot remove {}", id)));
        }
        Ok(())
    }
}

//! Job execution backends for docket.
//!
//! Provides:
//! - [`ContainerRunBackend`]: one ephemeral container per run
//! - [`ClusteredServiceBackend`]: one single-replica swarm service per run
//! - [`JobExecutionEngine`]: dispatches a job to the backend for its kind
//!
//! Everything talks to the engine through [`EngineClient`]; [`DockerClient`]
//! is the bollard-backed implementation.

pub mod client;
pub mod container;
pub mod docker;
pub mod engine;
pub mod image;
pub mod poller;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ContainerRequest, EngineClient, JOB_LABEL};
pub use container::ContainerRunBackend;
pub use docker::DockerClient;
pub use engine::JobExecutionEngine;
pub use image::ImageResolver;
pub use poller::{TaskCompletionPoller, TaskProgress, classify_tasks};
pub use service::{ClusteredServiceBackend, ResolvedRef, build_placement, build_service_spec};

//! Running a single job from the command line.

use anyhow::{Context, Result};
use docket_config::load_job_file;
use docket_core::{Executor, ExecutionStatus};
use docket_executor::{DockerClient, JobExecutionEngine};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run `name` once, print its output, and exit non-zero if it failed.
///
/// Ctrl-C cancels the run; whatever was created is still removed.
pub async fn run_job(config_path: &Path, name: &str) -> Result<()> {
    let file = load_job_file(config_path)
        .with_context(|| format!("Failed to load job file: {}", config_path.display()))?;
    let job = file
        .jobs
        .get(name)
        .with_context(|| format!("No job named {} in {}", name, config_path.display()))?;

    let client = DockerClient::connect()
        .await
        .context("Failed to connect to Docker")?;
    let engine = JobExecutionEngine::new(Arc::new(client), file.engine.poll_interval);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cleaning up...");
            on_interrupt.cancel();
        }
    });

    println!("Running {} ({} {})", job.name, job.kind, job.image_reference());
    let result = engine.execute(job, &cancel).await?;

    for line in result.lines() {
        println!("{}", line);
    }

    match result.status {
        ExecutionStatus::Succeeded => {
            println!("Job {} succeeded", job.name);
            Ok(())
        }
        ExecutionStatus::Failed(reason) => {
            println!("Job {} failed: {}", job.name, reason);
            std::process::exit(1);
        }
    }
}

//! docket server: cron scheduler plus the HTTP trigger API.

use anyhow::Context;
use clap::Parser;
use docket_api::shutdown::install_shutdown_handler;
use docket_api::{AppState, routes};
use docket_config::load_job_file;
use docket_core::Executor;
use docket_executor::{DockerClient, JobExecutionEngine};
use docket_scheduler::{OnDemandTrigger, TriggerScheduler};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docket-server")]
#[command(about = "Run scheduled and on-demand container jobs", long_about = None)]
#[command(version)]
struct Args {
    /// Job file
    #[arg(short, long, env = "DOCKET_CONFIG", default_value = "docket.kdl")]
    config: PathBuf,

    /// Address for the HTTP trigger API
    #[arg(short, long, env = "DOCKET_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let file = load_job_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    info!(
        path = %args.config.display(),
        jobs = file.jobs.len(),
        "Loaded job file"
    );

    let shutdown = install_shutdown_handler().context("installing signal handlers")?;

    info!("Connecting to Docker...");
    let client = Arc::new(DockerClient::connect().await?);
    let engine: Arc<dyn Executor> = Arc::new(JobExecutionEngine::new(
        client,
        file.engine.poll_interval,
    ));

    let scheduler = TriggerScheduler::new(engine.clone(), file.scheduled().cloned())?
        .with_parent_token(&shutdown);
    scheduler.start();

    let trigger = Arc::new(OnDemandTrigger::new(engine, file.exposed().cloned()));
    for name in trigger.job_names() {
        info!(job = %name, route = %format!("/jobs/run/{}", name), "Exposing job");
    }

    let app = routes::router(AppState::new(trigger, shutdown.clone()))
        .layer(TraceLayer::new_for_http());

    info!("Starting server on {}", args.listen);
    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    scheduler.shutdown().await;
    info!("Server stopped");
    Ok(())
}

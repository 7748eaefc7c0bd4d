//! docket CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "docket")]
#[command(about = "Check and run docket jobs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a job file
    Validate {
        /// Path to the job file
        #[arg(default_value = "docket.kdl")]
        path: PathBuf,
    },
    /// List the jobs in a job file
    Jobs {
        /// Path to the job file
        #[arg(default_value = "docket.kdl")]
        path: PathBuf,
    },
    /// Run one job now against the local Docker engine
    Run {
        /// Job name
        job: String,
        /// Path to the job file
        #[arg(short, long, env = "DOCKET_CONFIG", default_value = "docket.kdl")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Jobs { path } => {
            commands::jobs(&path)?;
        }
        Commands::Run { job, config } => {
            commands::run::run_job(&config, &job).await?;
        }
    }

    Ok(())
}

//! CLI command implementations.

pub mod run;

use anyhow::Result;
use docket_config::load_job_file;
use std::path::Path;

pub fn validate(path: &Path) -> Result<()> {
    match load_job_file(path) {
        Ok(file) => {
            println!(
                "Configuration is valid ({} jobs, {} scheduled, {} exposed)",
                file.jobs.len(),
                file.scheduled().count(),
                file.exposed().count()
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

pub fn jobs(path: &Path) -> Result<()> {
    let file = load_job_file(path)?;

    println!(
        "{:<20} {:<8} {:<30} {:<16} EXPOSED",
        "NAME", "KIND", "IMAGE", "SCHEDULE"
    );
    for job in file.jobs.values() {
        println!(
            "{:<20} {:<8} {:<30} {:<16} {}",
            job.name,
            job.kind.to_string(),
            job.image_reference(),
            job.schedule.as_deref().unwrap_or("-"),
            if job.externally_triggerable { "yes" } else { "no" }
        );
    }
    Ok(())
}

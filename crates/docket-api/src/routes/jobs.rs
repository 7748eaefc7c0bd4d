//! On-demand job endpoints.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use docket_scheduler::RunReport;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/run/{name}", get(run_job).post(run_job))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<String>,
}

async fn list_jobs(State(state): State<AppState>) -> Json<JobList> {
    let jobs = state
        .trigger
        .job_names()
        .into_iter()
        .map(String::from)
        .collect();
    Json(JobList { jobs })
}

/// Run a job and respond once it has finished.
///
/// The run is spawned so that a client hanging up does not interrupt it
/// half way; only server shutdown cancels it.
async fn run_job(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RunReport>, ApiError> {
    if !state.trigger.contains(&name) {
        return Err(ApiError::NotFound(format!("job {}", name)));
    }

    info!(job = %name, "Run requested");
    let trigger = state.trigger.clone();
    let cancel = state.shutdown.child_token();
    let report = tokio::spawn(async move { trigger.run_now(&name, &cancel).await })
        .await
        .map_err(|e| ApiError::Internal(format!("run aborted: {}", e)))??;

    Ok(Json(report))
}

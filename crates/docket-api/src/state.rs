//! Application state.

use docket_scheduler::OnDemandTrigger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub trigger: Arc<OnDemandTrigger>,
    /// Cancelled when the server shuts down; aborts runs still in flight.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(trigger: Arc<OnDemandTrigger>, shutdown: CancellationToken) -> Self {
        Self { trigger, shutdown }
    }
}

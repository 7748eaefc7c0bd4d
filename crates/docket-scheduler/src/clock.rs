//! Time source for the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Current time and sleeping until an instant.
///
/// Scheduler loops only read time through this, so tests can drive them
/// with tokio's paused clock instead of real sleeps.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Resolve once `deadline` has passed. Returns at once for past instants.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(remaining) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(remaining).await;
        }
    }
}

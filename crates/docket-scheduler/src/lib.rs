//! Job triggering for docket.
//!
//! Two ways a job gets run:
//! - [`TriggerScheduler`]: one cron loop per scheduled job
//! - [`OnDemandTrigger`]: run an exposed job by name, returning a [`RunReport`]

pub mod clock;
pub mod scheduler;
pub mod trigger;

pub use clock::{Clock, SystemClock};
pub use scheduler::{TriggerScheduler, next_fire_time};
pub use trigger::{OnDemandTrigger, RunReport};

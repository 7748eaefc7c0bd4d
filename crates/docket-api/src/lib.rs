//! HTTP trigger API for docket.
//!
//! Exposes externally triggerable jobs at `/jobs/run/{name}`.

pub mod error;
pub mod routes;
pub mod shutdown;
pub mod state;

pub use state::AppState;

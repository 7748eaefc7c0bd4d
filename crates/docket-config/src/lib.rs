//! KDL job file parsing for docket.
//!
//! This crate handles parsing of:
//! - Job definitions (docket.kdl)
//! - Engine settings

pub mod error;
pub mod jobs;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use jobs::{JobFile, load_job_file, parse_job_file, validate_job};
pub use settings::{DEFAULT_POLL_INTERVAL, EngineSettings};

//! Engine settings.

use crate::{ConfigError, ConfigResult};
use kdl::KdlNode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between swarm task inspections.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Settings for talking to the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How often a swarm service's task is inspected while it runs.
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Parse an `engine { ... }` node.
pub(crate) fn parse_engine(node: &KdlNode) -> ConfigResult<EngineSettings> {
    let mut settings = EngineSettings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "poll-interval-ms" | "poll_interval_ms" => {
                    let millis = child
                        .entries()
                        .iter()
                        .find(|e| e.name().is_none())
                        .and_then(|e| e.value().as_integer())
                        .ok_or_else(|| {
                            ConfigError::invalid("poll-interval-ms", "expected an integer")
                        })?;
                    let millis = u64::try_from(millis)
                        .ok()
                        .filter(|m| *m > 0)
                        .ok_or_else(|| {
                            ConfigError::invalid("poll-interval-ms", "must be greater than zero")
                        })?;
                    settings.poll_interval = Duration::from_millis(millis);
                }
                _ => {}
            }
        }
    }

    Ok(settings)
}

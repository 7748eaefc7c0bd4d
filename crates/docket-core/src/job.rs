//! Job definitions.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Tag applied when a job does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// How a job is executed against the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum JobKind {
    /// One ephemeral container on the local node.
    #[display("run")]
    #[serde(rename = "run")]
    SingleRun,
    /// A one-replica swarm service that runs to completion.
    #[display("service")]
    #[serde(rename = "service")]
    ClusteredService,
}

/// A validated job, as loaded from the job file.
///
/// Single-run jobs never carry secrets, configs, constraints or placement
/// preferences; the loader rejects them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Name the job was declared under.
    pub name: String,
    pub kind: JobKind,
    pub image: String,
    pub tag: String,
    /// Command to run; empty means the image default.
    pub command: Vec<String>,
    /// `KEY=VALUE` entries, in declaration order.
    pub environment: Vec<String>,
    /// Cron expression; `None` means the job only runs on demand.
    pub schedule: Option<String>,
    pub secrets: Vec<String>,
    pub configs: Vec<String>,
    pub constraints: Vec<String>,
    /// Spread descriptors, e.g. `node.labels.zone`.
    pub placement_preferences: Vec<String>,
    /// Whether the job may be run through the on-demand trigger.
    pub externally_triggerable: bool,
}

impl JobDefinition {
    /// A job with the default tag and every optional field empty.
    pub fn new(name: impl Into<String>, kind: JobKind, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            image: image.into(),
            tag: DEFAULT_TAG.to_string(),
            command: Vec::new(),
            environment: Vec::new(),
            schedule: None,
            secrets: Vec::new(),
            configs: Vec::new(),
            constraints: Vec::new(),
            placement_preferences: Vec::new(),
            externally_triggerable: false,
        }
    }

    /// `image:tag` reference used for lookups and pulls.
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

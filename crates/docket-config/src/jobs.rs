//! Job file parsing and validation.

use crate::settings::{EngineSettings, parse_engine};
use crate::{ConfigError, ConfigResult};
use docket_core::{CronSchedule, DEFAULT_TAG, JobDefinition, JobKind};
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// A loaded and validated job file.
#[derive(Debug, Clone, Default)]
pub struct JobFile {
    pub engine: EngineSettings,
    /// Jobs keyed by name.
    pub jobs: BTreeMap<String, JobDefinition>,
}

impl JobFile {
    /// Jobs that carry a cron schedule.
    pub fn scheduled(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.values().filter(|j| j.is_scheduled())
    }

    /// Jobs that may be run on demand.
    pub fn exposed(&self) -> impl Iterator<Item = &JobDefinition> {
        self.jobs.values().filter(|j| j.externally_triggerable)
    }
}

/// Read and parse a job file from disk.
pub fn load_job_file(path: impl AsRef<Path>) -> ConfigResult<JobFile> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file = parse_job_file(&content)?;
    debug!(path = %path.display(), jobs = file.jobs.len(), "Loaded job file");
    Ok(file)
}

/// Parse a job file from KDL text.
pub fn parse_job_file(kdl: &str) -> ConfigResult<JobFile> {
    let doc: KdlDocument = kdl.parse()?;

    let mut engine = EngineSettings::default();
    let mut jobs = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "engine" => {
                engine = parse_engine(node)?;
            }
            "job" => {
                let job = parse_job(node)?;
                validate_job(&job)?;
                if jobs.contains_key(&job.name) {
                    return Err(ConfigError::Duplicate(format!("job '{}'", job.name)));
                }
                jobs.insert(job.name.clone(), job);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(JobFile { engine, jobs })
}

fn parse_job(node: &KdlNode) -> ConfigResult<JobDefinition> {
    let name = get_first_string_arg(node)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField("job name".to_string()))?;

    let mut kind = None;
    let mut image = String::new();
    let mut tag = None;
    let mut job = JobDefinition::new(name.clone(), JobKind::SingleRun, "");

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "kind" | "type" => {
                    let value = get_first_string_arg(child).unwrap_or_default();
                    kind = Some(parse_kind(&name, &value)?);
                }
                "image" => {
                    image = get_first_string_arg(child).unwrap_or_default();
                }
                "tag" => {
                    tag = get_first_string_arg(child).filter(|t| !t.is_empty());
                }
                "schedule" => {
                    job.schedule = get_first_string_arg(child).filter(|s| !s.trim().is_empty());
                }
                "command" | "cmd" => {
                    job.command = get_all_string_args(child);
                }
                "env" => {
                    job.environment.extend(get_all_string_args(child));
                    if let Some(grandchildren) = child.children() {
                        for gc in grandchildren.nodes() {
                            let key = gc.name().value();
                            let value = get_first_string_arg(gc).unwrap_or_default();
                            job.environment.push(format!("{}={}", key, value));
                        }
                    }
                }
                "secrets" => {
                    job.secrets = get_all_string_args(child);
                }
                "configs" => {
                    job.configs = get_all_string_args(child);
                }
                "constraints" => {
                    job.constraints = get_all_string_args(child);
                }
                "placement-preferences" | "placement_preferences" => {
                    job.placement_preferences = get_all_string_args(child);
                }
                "expose" | "api-expose" | "api_expose" => {
                    job.externally_triggerable = get_first_bool_arg(child).unwrap_or(true);
                }
                _ => {}
            }
        }
    }

    job.kind = kind.ok_or_else(|| ConfigError::MissingField(format!("kind for job '{}'", name)))?;
    job.image = image;
    job.tag = tag.unwrap_or_else(|| DEFAULT_TAG.to_string());

    Ok(job)
}

fn parse_kind(job: &str, value: &str) -> ConfigResult<JobKind> {
    match value {
        "run" => Ok(JobKind::SingleRun),
        "service" => Ok(JobKind::ClusteredService),
        other => Err(ConfigError::invalid(
            format!("kind of job '{}'", job),
            format!("'{}' is not one of run, service", other),
        )),
    }
}

/// Check the rules a job must satisfy before the engine sees it.
pub fn validate_job(job: &JobDefinition) -> ConfigResult<()> {
    if job.image.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "image for job '{}'",
            job.name
        )));
    }

    if let Some(schedule) = &job.schedule {
        CronSchedule::parse(schedule).map_err(|e| {
            ConfigError::invalid(format!("schedule of job '{}'", job.name), e.to_string())
        })?;
    }

    if let Some(entry) = job.environment.iter().find(|e| !e.contains('=')) {
        return Err(ConfigError::invalid(
            format!("env of job '{}'", job.name),
            format!("'{}' is not KEY=VALUE", entry),
        ));
    }

    if job.kind == JobKind::SingleRun
        && (!job.secrets.is_empty()
            || !job.configs.is_empty()
            || !job.constraints.is_empty()
            || !job.placement_preferences.is_empty())
    {
        return Err(ConfigError::invalid(
            format!("job '{}'", job.name),
            "secrets, configs, constraints and placement preferences are only allowed for services",
        ));
    }

    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_simple_job() {
        let kdl = r#"
            job "backup" {
                kind "run"
                image "alpine"
                command "echo" "hi"
            }
        "#;

        let file = parse_job_file(kdl).unwrap();
        let job = &file.jobs["backup"];
        assert_eq!(job.name, "backup");
        assert_eq!(job.kind, JobKind::SingleRun);
        assert_eq!(job.image, "alpine");
        assert_eq!(job.tag, "latest");
        assert_eq!(job.command, vec!["echo", "hi"]);
        assert!(job.schedule.is_none());
        assert!(!job.externally_triggerable);
    }

    #[test]
    fn test_parse_service_job() {
        let kdl = r#"
            job "batch" {
                kind "service"
                image "busybox"
                tag "1.36"
                schedule "*/5 * * * *"
                env "MODE=full" "VERBOSE=1"
                secrets "db-password"
                configs "app-settings"
                constraints "node.role==worker" "node.labels.ssd==true"
                placement-preferences "node.labels.zone" "node.labels.rack"
                expose #true
            }
        "#;

        let file = parse_job_file(kdl).unwrap();
        let job = &file.jobs["batch"];
        assert_eq!(job.kind, JobKind::ClusteredService);
        assert_eq!(job.image_reference(), "busybox:1.36");
        assert_eq!(job.schedule.as_deref(), Some("*/5 * * * *"));
        assert_eq!(job.environment, vec!["MODE=full", "VERBOSE=1"]);
        assert_eq!(job.secrets, vec!["db-password"]);
        assert_eq!(job.configs, vec!["app-settings"]);
        assert_eq!(
            job.constraints,
            vec!["node.role==worker", "node.labels.ssd==true"]
        );
        assert_eq!(
            job.placement_preferences,
            vec!["node.labels.zone", "node.labels.rack"]
        );
        assert!(job.externally_triggerable);
        assert_eq!(file.scheduled().count(), 1);
        assert_eq!(file.exposed().count(), 1);
    }

    #[test]
    fn test_env_block_syntax() {
        let kdl = r#"
            job "report" {
                kind "run"
                image "alpine"
                env {
                    REGION "eu-west-1"
                    DEBUG "true"
                }
            }
        "#;

        let file = parse_job_file(kdl).unwrap();
        assert_eq!(
            file.jobs["report"].environment,
            vec!["REGION=eu-west-1", "DEBUG=true"]
        );
    }

    #[test]
    fn test_engine_settings() {
        let kdl = r#"
            engine {
                poll-interval-ms 250
            }
        "#;

        let file = parse_job_file(kdl).unwrap();
        assert_eq!(file.engine.poll_interval, Duration::from_millis(250));
        assert!(file.jobs.is_empty());
    }

    #[test]
    fn test_engine_settings_default() {
        let file = parse_job_file("").unwrap();
        assert_eq!(file.engine.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let kdl = r#"
            engine {
                poll-interval-ms 0
            }
        "#;

        let result = parse_job_file(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let kdl = r#"
            job "weird" {
                kind "daemon"
                image "alpine"
            }
        "#;

        let result = parse_job_file(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_missing_kind_rejected() {
        let kdl = r#"
            job "nokind" {
                image "alpine"
            }
        "#;

        let result = parse_job_file(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_missing_image_rejected() {
        let kdl = r#"
            job "noimage" {
                kind "run"
            }
        "#;

        let result = parse_job_file(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let kdl = r#"
            job "bad-cron" {
                kind "run"
                image "alpine"
                schedule "every tuesday"
            }
        "#;

        let err = parse_job_file(kdl).unwrap_err();
        assert!(err.to_string().contains("schedule of job 'bad-cron'"));
    }

    #[test]
    fn test_run_job_with_constraints_rejected() {
        let kdl = r#"
            job "misplaced" {
                kind "run"
                image "alpine"
                constraints "node.role==worker"
            }
        "#;

        let err = parse_job_file(kdl).unwrap_err();
        assert!(err.to_string().contains("only allowed for services"));
    }

    #[test]
    fn test_malformed_env_rejected() {
        let kdl = r#"
            job "env" {
                kind "run"
                image "alpine"
                env "NOEQUALS"
            }
        "#;

        let result = parse_job_file(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let kdl = r#"
            job "twice" {
                kind "run"
                image "alpine"
            }
            job "twice" {
                kind "run"
                image "busybox"
            }
        "#;

        let result = parse_job_file(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_load_job_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docket.kdl");
        std::fs::write(
            &path,
            r#"
            job "backup" {
                kind "run"
                image "alpine"
            }
            "#,
        )
        .unwrap();

        let file = load_job_file(&path).unwrap();
        assert!(file.jobs.contains_key("backup"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_job_file("/nonexistent/docket.kdl");
        assert!(matches!(result.unwrap_err(), ConfigError::Io { .. }));
    }
}

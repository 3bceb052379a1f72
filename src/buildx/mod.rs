//! `docker buildx` builder management and build invocation.
//!
//! Behavior of [`ensure_builder`]:
//! - runs `docker buildx inspect <name>` (read-only);
//! - if that fails, runs `docker buildx create --name <name> --driver <driver>`
//!   exactly once;
//! - given a lock directory, the check-then-create pair runs under an
//!   exclusive file lock per builder name so concurrent publishes do not
//!   both create it. Dry runs pass no directory and take no lock.

pub mod lock;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::process::{Cmd, CommandRunner};
use crate::tags::TagSet;

pub use lock::BuilderLock;

const DOCKER: &str = "docker";

/// A named multi-platform builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderSpec {
    pub name: String,
    pub driver: String,
}

/// Outcome of [`ensure_builder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderOutcome {
    AlreadyPresent,
    Created,
}

impl BuilderOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuilderOutcome::AlreadyPresent => "already_present",
            BuilderOutcome::Created => "created",
        }
    }
}

pub fn inspect_command(spec: &BuilderSpec) -> Cmd {
    Cmd::new(DOCKER)
        .args(["buildx", "inspect"])
        .arg(spec.name.as_str())
        .allow_fail()
        .read_only()
}

pub fn create_command(spec: &BuilderSpec) -> Cmd {
    Cmd::new(DOCKER)
        .args(["buildx", "create", "--name"])
        .arg(spec.name.as_str())
        .arg("--driver")
        .arg(spec.driver.as_str())
        .error_msg(format!("creating buildx builder '{}'", spec.name))
}

/// Whether a builder named `spec.name` exists. Does not create anything.
pub fn builder_exists(runner: &dyn CommandRunner, spec: &BuilderSpec) -> Result<bool> {
    let result = inspect_command(spec)
        .run_with(runner)
        .with_context(|| format!("inspecting buildx builder '{}'", spec.name))?;
    Ok(result.success())
}

/// Create the builder unless it already exists.
pub fn ensure_builder(
    runner: &dyn CommandRunner,
    spec: &BuilderSpec,
    lock_dir: Option<&Path>,
) -> Result<BuilderOutcome> {
    let _lock = lock_dir
        .map(|dir| BuilderLock::acquire(dir, &spec.name))
        .transpose()?;

    if builder_exists(runner, spec)? {
        tracing::debug!(builder = %spec.name, "buildx builder already present");
        return Ok(BuilderOutcome::AlreadyPresent);
    }

    tracing::info!(builder = %spec.name, driver = %spec.driver, "creating buildx builder");
    create_command(spec).run_with(runner)?;
    Ok(BuilderOutcome::Created)
}

/// Everything `docker buildx build` needs for one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub builder: String,
    pub platforms: Vec<String>,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub tags: TagSet,
    pub labels: BTreeMap<String, String>,
    pub push: bool,
}

/// `docker buildx build` for `request`. Output is streamed to the terminal.
pub fn build_command(request: &BuildRequest) -> Cmd {
    let mut cmd = Cmd::new(DOCKER)
        .args(["buildx", "build", "--builder"])
        .arg(request.builder.as_str())
        .arg("--platform")
        .arg(request.platforms.join(","))
        .arg("--file")
        .arg_path(&request.dockerfile);

    for tag in request.tags.as_vec() {
        cmd = cmd.arg("--tag").arg(tag);
    }
    for (key, value) in &request.labels {
        cmd = cmd.arg("--label").arg(format!("{key}={value}"));
    }
    if request.push {
        cmd = cmd.arg("--push");
    }

    cmd.arg_path(&request.context)
        .error_msg(format!(
            "building and pushing {} for {}",
            request.tags.versioned,
            request.platforms.join(", ")
        ))
        .stream()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::RecordingRunner;
    use tempfile::TempDir;

    fn spec() -> BuilderSpec {
        BuilderSpec {
            name: "multiplatform".into(),
            driver: "docker-container".into(),
        }
    }

    #[test]
    fn existing_builder_is_not_recreated() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();

        let outcome = ensure_builder(&runner, &spec(), Some(tmp.path())).unwrap();

        assert_eq!(outcome, BuilderOutcome::AlreadyPresent);
        assert_eq!(
            runner.calls(),
            vec![vec!["docker", "buildx", "inspect", "multiplatform"]]
        );
    }

    #[test]
    fn missing_builder_is_created_once() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new().fail_when(&["docker", "buildx", "inspect"]);

        let outcome = ensure_builder(&runner, &spec(), Some(tmp.path())).unwrap();

        assert_eq!(outcome, BuilderOutcome::Created);
        assert_eq!(
            runner.calls(),
            vec![
                vec!["docker", "buildx", "inspect", "multiplatform"],
                vec![
                    "docker",
                    "buildx",
                    "create",
                    "--name",
                    "multiplatform",
                    "--driver",
                    "docker-container"
                ],
            ]
        );
    }

    #[test]
    fn create_failure_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new()
            .fail_when(&["docker", "buildx", "inspect"])
            .fail_when(&["docker", "buildx", "create"]);

        let err = ensure_builder(&runner, &spec(), Some(tmp.path()))
            .unwrap_err()
            .to_string();
        assert!(err.contains("creating buildx builder 'multiplatform'"));
    }

    #[test]
    fn ensures_without_lock_dir() {
        let runner = RecordingRunner::new().fail_when(&["docker", "buildx", "inspect"]);

        let outcome = ensure_builder(&runner, &spec(), None).unwrap();

        assert_eq!(outcome, BuilderOutcome::Created);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn build_command_names_platforms_tags_and_push() {
        let request = BuildRequest {
            builder: "multiplatform".into(),
            platforms: vec!["linux/amd64".into(), "linux/arm64".into()],
            dockerfile: PathBuf::from("/repo/Dockerfile"),
            context: PathBuf::from("/repo"),
            tags: TagSet {
                latest: "ghcr.io/raine-works/foo:latest".into(),
                versioned: "ghcr.io/raine-works/foo:1.2.3".into(),
            },
            labels: BTreeMap::from([(
                "org.opencontainers.image.version".to_string(),
                "1.2.3".to_string(),
            )]),
            push: true,
        };

        let cmd = build_command(&request);
        assert_eq!(
            cmd.argv(),
            vec![
                "docker",
                "buildx",
                "build",
                "--builder",
                "multiplatform",
                "--platform",
                "linux/amd64,linux/arm64",
                "--file",
                "/repo/Dockerfile",
                "--tag",
                "ghcr.io/raine-works/foo:latest",
                "--tag",
                "ghcr.io/raine-works/foo:1.2.3",
                "--label",
                "org.opencontainers.image.version=1.2.3",
                "--push",
                "/repo",
            ]
        );
        assert!(cmd.is_streamed());
        assert!(!cmd.is_read_only());
    }
}

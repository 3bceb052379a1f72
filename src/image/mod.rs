//! Declarative image definition.
//!
//! An image is a base image plus an ordered list of [`Step`]s describing
//! WHAT the image contains. [`dockerfile`] renders the steps for the
//! external build tool; nothing here runs a build.
//!
//! # Example
//!
//! ```rust
//! use image_builder::image::{ImageDefinition, StartupCommand, Step};
//!
//! let image = ImageDefinition {
//!     base_image: "ubuntu:22.04".into(),
//!     steps: vec![
//!         Step::InstallPackages(vec!["curl".into()]),
//!         Step::Expose(1234),
//!         Step::Startup(StartupCommand {
//!             binary: "lms".into(),
//!             port: 1234,
//!             cors: true,
//!             bind: "0.0.0.0".into(),
//!         }),
//!     ],
//! };
//! assert!(image.validate().is_ok());
//! ```

pub mod dockerfile;

use anyhow::{bail, Result};
use std::fmt;

use crate::config::ImageConfig;

pub use dockerfile::{check_dockerfile, render_dockerfile, write_dockerfile, WriteOutcome};

/// Environment flag that makes an AppImage extract itself instead of
/// mounting through FUSE.
pub const EXTRACT_AND_RUN_ENV: &str = "APPIMAGE_EXTRACT_AND_RUN";

/// One provisioning step. Steps run in order and any failure aborts the
/// whole build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Install OS packages from the distribution mirror.
    InstallPackages(Vec<String>),

    /// Fetch a remote install script and pipe it to a shell.
    RunRemoteScript { url: String },

    /// Create (or replace) a symlink.
    Symlink { link: String, target: String },

    /// Run a shell command once at build time.
    Run(String),

    /// Prepend a directory to `PATH`.
    PrependPath(String),

    /// Set an environment variable.
    Env { key: String, value: String },

    /// Declare an exposed TCP port.
    Expose(u16),

    /// Container main process. Must be the last step.
    Startup(StartupCommand),
}

/// Bring the daemon up, then start the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupCommand {
    pub binary: String,
    pub port: u16,
    pub cors: bool,
    pub bind: String,
}

impl StartupCommand {
    pub fn daemon_up(&self) -> Vec<String> {
        vec![self.binary.clone(), "daemon".into(), "up".into()]
    }

    pub fn server_start(&self) -> Vec<String> {
        let mut argv = vec![
            self.binary.clone(),
            "server".into(),
            "start".into(),
            "--port".into(),
            self.port.to_string(),
        ];
        if self.cors {
            argv.push("--cors".into());
        }
        argv.push("--bind".into());
        argv.push(self.bind.clone());
        argv
    }
}

impl fmt::Display for StartupCommand {
    /// Shell form: the server only starts if the daemon came up.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} && {}",
            self.daemon_up().join(" "),
            self.server_start().join(" ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDefinition {
    pub base_image: String,
    pub steps: Vec<Step>,
}

impl ImageDefinition {
    /// Build the step list in its fixed order: packages, remote install,
    /// symlink, bootstrap, environment, port, startup.
    pub fn from_config(config: &ImageConfig) -> Result<Self> {
        let mut steps = Vec::new();

        if !config.packages.is_empty() {
            steps.push(Step::InstallPackages(config.packages.clone()));
        }
        if !config.install_script.is_empty() {
            steps.push(Step::RunRemoteScript {
                url: config.install_script.clone(),
            });
        }
        if let Some(symlink) = &config.symlink {
            steps.push(Step::Symlink {
                link: symlink.link.clone(),
                target: symlink.target.clone(),
            });
        }
        steps.extend(config.bootstrap.iter().cloned().map(Step::Run));

        if let Some(dir) = &config.path_prepend {
            steps.push(Step::PrependPath(dir.clone()));
        }
        if config.extract_and_run {
            steps.push(Step::Env {
                key: EXTRACT_AND_RUN_ENV.to_string(),
                value: "1".to_string(),
            });
        }
        for (key, value) in &config.env {
            steps.push(Step::Env {
                key: key.clone(),
                value: value.clone(),
            });
        }

        steps.push(Step::Expose(config.port));
        steps.push(Step::Startup(StartupCommand {
            binary: config.server.binary.clone(),
            port: config.port,
            cors: config.server.cors,
            bind: config.server.bind.clone(),
        }));

        let image = Self {
            base_image: config.base.clone(),
            steps,
        };
        image.validate()?;
        Ok(image)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_image.trim().is_empty() || self.base_image.contains(char::is_whitespace) {
            bail!("invalid base image '{}'", self.base_image);
        }

        let startups = self
            .steps
            .iter()
            .filter(|step| matches!(step, Step::Startup(_)))
            .count();
        if startups != 1 || !matches!(self.steps.last(), Some(Step::Startup(_))) {
            bail!("image must end with exactly one startup command (found {startups})");
        }

        for step in &self.steps {
            validate_step(step)?;
        }
        Ok(())
    }

    /// Ports declared with [`Step::Expose`].
    pub fn exposed_ports(&self) -> Vec<u16> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Expose(port) => Some(*port),
                _ => None,
            })
            .collect()
    }
}

fn validate_step(step: &Step) -> Result<()> {
    match step {
        Step::InstallPackages(packages) => {
            if packages.is_empty() {
                bail!("package install step lists no packages");
            }
            for package in packages {
                let valid = !package.is_empty()
                    && package
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | ':' | '='));
                if !valid {
                    bail!("invalid package name '{package}'");
                }
            }
        }
        Step::RunRemoteScript { url } => {
            if !(url.starts_with("https://") || url.starts_with("http://"))
                || url.contains(char::is_whitespace)
                || url.contains(['\'', '"', ';', '|', '&', '$', '`'])
            {
                bail!("install script must be a plain http(s) URL, got '{url}'");
            }
        }
        Step::Symlink { link, target } => {
            if !is_plain_path(link) || !is_plain_path(target) {
                bail!(
                    "symlink paths must be plain paths ([A-Za-z0-9/._+-]): '{link}' -> '{target}'"
                );
            }
        }
        Step::Run(command) => {
            if command.trim().is_empty() {
                bail!("bootstrap command must not be empty");
            }
            if has_line_break(command) {
                bail!("bootstrap command must be a single line: {command:?}");
            }
        }
        Step::PrependPath(dir) => {
            if !is_plain_path(dir) {
                bail!("invalid PATH entry {dir:?}");
            }
        }
        Step::Env { key, value } => {
            let mut chars = key.chars();
            let valid = chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                bail!("invalid environment variable name '{key}'");
            }
            if has_line_break(value) {
                bail!("value of {key} must be a single line");
            }
        }
        Step::Expose(port) => {
            if *port == 0 {
                bail!("exposed port must be non-zero");
            }
        }
        Step::Startup(startup) => {
            if !is_plain_path(&startup.binary) {
                bail!("invalid server binary '{}'", startup.binary);
            }
            if startup.port == 0 {
                bail!("server port must be non-zero");
            }
            let bind_ok = !startup.bind.is_empty()
                && startup
                    .bind
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '[' | ']'));
            if !bind_ok {
                bail!("invalid bind address '{}'", startup.bind);
            }
        }
    }
    Ok(())
}

/// Rendered unquoted into shell and `ENV` lines, so no metacharacters.
fn is_plain_path(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '+' | '-'))
}

/// A line break ends the Dockerfile instruction early.
fn has_line_break(value: &str) -> bool {
    value.contains(['\n', '\r'])
}

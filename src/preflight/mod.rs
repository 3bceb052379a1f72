//! Preflight checks before publishing.
//!
//! Validates that the host has the container tooling a publish needs.
//! This turns a missing `docker` or buildx plugin into one clear error
//! instead of a failure halfway through a build.
//!
//! # Example
//!
//! ```rust,ignore
//! use image_builder::preflight::{check_required_tools, command_exists};
//!
//! if !command_exists("docker") {
//!     println!("docker not installed");
//! }
//!
//! let tools = &[("docker", "docker-ce-cli")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

use crate::process::{Cmd, CommandRunner};

/// Check if a command exists on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools required for publishing.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("docker", "docker-ce-cli or docker.io")];

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        bail!("Missing required host tools:\n{}", missing.join("\n"));
    }

    Ok(())
}

/// `docker buildx version` must succeed. Returns the reported version.
pub fn check_buildx(runner: &dyn CommandRunner) -> Result<String> {
    let result = Cmd::new("docker")
        .args(["buildx", "version"])
        .error_msg("docker buildx is not available (install the docker-buildx plugin)")
        .read_only()
        .run_with(runner)?;
    Ok(result.stdout.trim().to_string())
}

/// Run every preflight check.
pub fn check_host_tools(runner: &dyn CommandRunner) -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)?;
    let version = check_buildx(runner)?;
    tracing::debug!(%version, "docker buildx available");
    Ok(())
}

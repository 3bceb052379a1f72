//! Dockerfile rendering for an [`ImageDefinition`].

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{ImageDefinition, Step};

const HEADER: &str = "# Generated by image-builder. Edit image.toml and run `image-builder render`.";

/// Every `RUN` executes under this shell, so a failing command anywhere in a
/// pipeline (e.g. an unreachable install script piped into bash) fails the
/// build.
const SHELL_FORM: &[&str] = &["/bin/bash", "-o", "pipefail", "-c"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Render `image` as Dockerfile text. Output depends only on `image`.
pub fn render_dockerfile(image: &ImageDefinition) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    let _ = writeln!(out, "FROM {}", image.base_image);
    out.push('\n');
    let _ = writeln!(out, "SHELL {}", json_array(SHELL_FORM.iter().copied()));

    for step in &image.steps {
        out.push('\n');
        out.push_str(&render_step(step));
        out.push('\n');
    }

    out
}

fn render_step(step: &Step) -> String {
    match step {
        Step::InstallPackages(packages) => format!(
            "RUN apt-get update \\\n    && DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends {} \\\n    && rm -rf /var/lib/apt/lists/*",
            packages.join(" ")
        ),
        Step::RunRemoteScript { url } => format!("RUN curl -fsSL {url} | bash"),
        Step::Symlink { link, target } => format!("RUN ln -sf {target} {link}"),
        Step::Run(command) => format!("RUN {command}"),
        Step::PrependPath(dir) => format!("ENV PATH=\"{}:${{PATH}}\"", escape_env_value(dir)),
        Step::Env { key, value } => format!("ENV {key}=\"{}\"", escape_env_value(value)),
        Step::Expose(port) => format!("EXPOSE {port}"),
        Step::Startup(startup) => {
            let command = startup.to_string();
            format!("CMD {}", json_array(["/bin/sh", "-c", command.as_str()]))
        }
    }
}

fn escape_env_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn json_array<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let items: Vec<&str> = items.into_iter().collect();
    // Serializing a Vec<&str> cannot fail.
    serde_json::to_string(&items).unwrap_or_default().replace("\",\"", "\", \"")
}

/// Write the rendering to `path`, skipping the write when nothing changed.
pub fn write_dockerfile(image: &ImageDefinition, path: &Path) -> Result<WriteOutcome> {
    let rendered = render_dockerfile(image);

    if let Ok(existing) = fs::read_to_string(path) {
        if existing == rendered {
            return Ok(WriteOutcome::Unchanged);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory '{}'", parent.display()))?;
    }
    fs::write(path, &rendered)
        .with_context(|| format!("writing Dockerfile '{}'", path.display()))?;
    tracing::info!(path = %path.display(), "rendered Dockerfile");
    Ok(WriteOutcome::Written)
}

/// Fail if the file at `path` is missing or differs from the rendering.
pub fn check_dockerfile(image: &ImageDefinition, path: &Path) -> Result<()> {
    let rendered = render_dockerfile(image);
    let existing = fs::read_to_string(path)
        .with_context(|| format!("reading Dockerfile '{}'", path.display()))?;

    if existing != rendered {
        bail!(
            "Dockerfile '{}' is out of date; run `image-builder render` to regenerate it",
            path.display()
        );
    }
    Ok(())
}

//! Build-and-push orchestration.
//!
//! A publish is: compute tags from the package manifest, make sure the
//! multi-platform builder exists, then run one `docker buildx build --push`
//! for every configured platform. Nothing is retried and nothing is rolled
//! back; the registry is only touched by the final push.
//!
//! [`run`] wraps that in the release sequence: Dockerfile write, publish,
//! receipt. A receipt only exists for a build that pushed.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::buildx::{self, BuildRequest, BuilderOutcome, BuilderSpec};
use crate::config::LoadedConfig;
use crate::image::{
    check_dockerfile, render_dockerfile, write_dockerfile, ImageDefinition, WriteOutcome,
};
use crate::manifest::PackageManifest;
use crate::process::{CommandRunner, DryRunRunner};
use crate::receipts::{sha256_hex, write_receipt, PublishReceipt};
use crate::tags::TagSet;

/// Resolved inputs for one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPlan {
    pub manifest: PackageManifest,
    pub builder: BuilderSpec,
    pub build: BuildRequest,
    pub receipts_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub builder: BuilderOutcome,
    pub tags: TagSet,
}

/// What [`run`] did.
#[derive(Debug)]
pub struct PublishReport {
    pub plan: PublishPlan,
    pub outcome: PublishOutcome,
    pub dry_run: bool,
    /// `None` on a dry run.
    pub dockerfile: Option<WriteOutcome>,
    /// Dry run only: why the Dockerfile on disk would be rewritten.
    pub drift: Option<String>,
    /// `None` on a dry run.
    pub receipt: Option<PathBuf>,
}

impl PublishPlan {
    /// `created` becomes the `org.opencontainers.image.created` label.
    pub fn new(
        loaded: &LoadedConfig,
        manifest: PackageManifest,
        created: OffsetDateTime,
    ) -> Result<Self> {
        let publish = &loaded.config.publish;

        let tags = TagSet::compute(&publish.registry, &publish.owner, &manifest)
            .with_context(|| format!("computing image tags for '{}'", manifest.name))?;
        validate_platforms(&publish.platforms)?;
        if publish.builder.trim().is_empty() {
            bail!("buildx builder name must not be empty");
        }

        let mut labels = BTreeMap::from([
            (
                "org.opencontainers.image.title".to_string(),
                manifest.name.clone(),
            ),
            (
                "org.opencontainers.image.version".to_string(),
                manifest.version.clone(),
            ),
            (
                "org.opencontainers.image.created".to_string(),
                format_timestamp(created)?,
            ),
        ]);
        if let Some(source) = &publish.source {
            labels.insert(
                "org.opencontainers.image.source".to_string(),
                source.clone(),
            );
        }

        Ok(Self {
            builder: BuilderSpec {
                name: publish.builder.clone(),
                driver: publish.builder_driver.clone(),
            },
            build: BuildRequest {
                builder: publish.builder.clone(),
                platforms: publish.platforms.clone(),
                dockerfile: loaded.dockerfile_path(),
                context: loaded.context_dir(),
                tags,
                labels,
                push: true,
            },
            receipts_dir: loaded.receipts_dir(),
            manifest,
        })
    }

    pub fn tags(&self) -> &TagSet {
        &self.build.tags
    }

    /// Receipt for a completed publish of this plan.
    pub fn receipt(
        &self,
        outcome: &PublishOutcome,
        dockerfile: &[u8],
        published_at: OffsetDateTime,
    ) -> Result<PublishReceipt> {
        Ok(PublishReceipt {
            name: self.manifest.name.clone(),
            version: self.manifest.version.clone(),
            tags: outcome.tags.as_vec(),
            platforms: self.build.platforms.clone(),
            builder: self.builder.name.clone(),
            builder_outcome: outcome.builder.as_str().to_string(),
            dockerfile_sha256: sha256_hex(dockerfile),
            published_at: format_timestamp(published_at)?,
        })
    }
}

/// Ensure the builder, then build and push. The build is never started if
/// the builder cannot be created.
pub fn publish(
    runner: &dyn CommandRunner,
    plan: &PublishPlan,
    lock_dir: Option<&Path>,
) -> Result<PublishOutcome> {
    let builder = buildx::ensure_builder(runner, &plan.builder, lock_dir)
        .with_context(|| format!("ensuring buildx builder '{}'", plan.builder.name))?;

    tracing::info!(
        latest = %plan.build.tags.latest,
        versioned = %plan.build.tags.versioned,
        platforms = %plan.build.platforms.join(","),
        "building and pushing image"
    );
    buildx::build_command(&plan.build).run_with(runner)?;

    Ok(PublishOutcome {
        builder,
        tags: plan.build.tags.clone(),
    })
}

/// Release `loaded` with `runner`.
///
/// A real run writes the Dockerfile, publishes under the builder lock and
/// records a receipt. A dry run routes mutating commands through
/// [`DryRunRunner`], only checks the Dockerfile for drift, takes no lock
/// and writes nothing.
pub fn run(
    runner: &dyn CommandRunner,
    loaded: &LoadedConfig,
    dry_run: bool,
    now: OffsetDateTime,
) -> Result<PublishReport> {
    let manifest = PackageManifest::load(&loaded.manifest_path())?;
    let image = ImageDefinition::from_config(&loaded.config.image)
        .context("building image definition from config")?;
    let plan = PublishPlan::new(loaded, manifest, now)?;
    let dockerfile = loaded.dockerfile_path();

    if dry_run {
        let drift = check_dockerfile(&image, &dockerfile)
            .err()
            .map(|err| format!("{err:#}"));
        let outcome = publish(&DryRunRunner::new(runner), &plan, None)?;
        return Ok(PublishReport {
            plan,
            outcome,
            dry_run,
            dockerfile: None,
            drift,
            receipt: None,
        });
    }

    let written = write_dockerfile(&image, &dockerfile)?;
    let lock_dir = loaded.lock_dir();
    let outcome = publish(runner, &plan, Some(lock_dir.as_path()))
        .with_context(|| format!("publishing {}", plan.tags().versioned))?;

    let rendered = render_dockerfile(&image);
    let receipt = plan.receipt(&outcome, rendered.as_bytes(), now)?;
    let receipt_path = write_receipt(&plan.receipts_dir, &receipt)?;
    tracing::info!(path = %receipt_path.display(), "wrote publish receipt");

    Ok(PublishReport {
        plan,
        outcome,
        dry_run,
        dockerfile: Some(written),
        drift: None,
        receipt: Some(receipt_path),
    })
}

fn validate_platforms(platforms: &[String]) -> Result<()> {
    if platforms.is_empty() {
        bail!("at least one target platform is required");
    }
    for platform in platforms {
        let mut parts = platform.split('/');
        let os = parts.next().unwrap_or_default();
        let arch = parts.next().unwrap_or_default();
        if os.is_empty() || arch.is_empty() || parts.count() > 1 {
            bail!("invalid platform '{platform}': expected os/arch[/variant]");
        }
    }
    Ok(())
}

pub fn format_timestamp(at: OffsetDateTime) -> Result<String> {
    let at = at
        .to_offset(time::UtcOffset::UTC)
        .replace_nanosecond(0)
        .context("truncating timestamp")?;
    at.format(&Rfc3339).context("formatting timestamp")
}

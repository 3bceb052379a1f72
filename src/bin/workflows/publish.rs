use anyhow::Result;
use image_builder::buildx::{self, BuilderOutcome, BuilderSpec};
use image_builder::image::WriteOutcome;
use image_builder::process::SystemRunner;
use image_builder::{preflight as host, LoadedConfig};
use time::OffsetDateTime;

pub(crate) fn publish(loaded: &LoadedConfig, dry_run: bool) -> Result<()> {
    if !dry_run {
        host::check_host_tools(&SystemRunner)?;
    }

    let report =
        image_builder::publish::run(&SystemRunner, loaded, dry_run, OffsetDateTime::now_utc())?;
    let prefix = format!("[publish:{}]", report.plan.manifest.name);
    let dockerfile = loaded.dockerfile_path();
    let tags = &report.outcome.tags;

    if report.dry_run {
        println!("{prefix} dry run; mutating commands were printed, not executed");
        if let Some(drift) = &report.drift {
            println!("{prefix} {drift}; a real publish would rewrite it");
        }
        println!("{prefix} would push {} and {}", tags.latest, tags.versioned);
        return Ok(());
    }

    match report.dockerfile {
        Some(WriteOutcome::Written) => println!("{prefix} rendered {}", dockerfile.display()),
        Some(WriteOutcome::Unchanged) | None => {
            println!("{prefix} {} up to date", dockerfile.display())
        }
    }
    println!(
        "{prefix} builder '{}' {}",
        report.plan.builder.name,
        describe(report.outcome.builder)
    );
    println!(
        "{prefix} pushed {} and {} ({})",
        tags.latest,
        tags.versioned,
        report.plan.build.platforms.join(", ")
    );
    if let Some(receipt) = &report.receipt {
        println!("{prefix} receipt at {}", receipt.display());
    }

    Ok(())
}

pub(crate) fn ensure_builder(loaded: &LoadedConfig) -> Result<()> {
    let spec = BuilderSpec {
        name: loaded.config.publish.builder.clone(),
        driver: loaded.config.publish.builder_driver.clone(),
    };
    let lock_dir = loaded.lock_dir();
    let outcome = buildx::ensure_builder(&SystemRunner, &spec, Some(lock_dir.as_path()))?;
    println!("[builder:{}] {}", spec.name, describe(outcome));
    Ok(())
}

pub(crate) fn preflight() -> Result<()> {
    host::check_host_tools(&SystemRunner)?;
    println!("[preflight] docker and buildx available");
    Ok(())
}

fn describe(outcome: BuilderOutcome) -> &'static str {
    match outcome {
        BuilderOutcome::AlreadyPresent => "already present",
        BuilderOutcome::Created => "created",
    }
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image_builder::image::{check_dockerfile, render_dockerfile, write_dockerfile, WriteOutcome};
use image_builder::receipts::{latest_receipt, load_receipts};
use image_builder::{ImageDefinition, LoadedConfig, PackageManifest, TagSet};

pub(crate) fn render(loaded: &LoadedConfig, output: Option<PathBuf>, check: bool) -> Result<()> {
    let image = ImageDefinition::from_config(&loaded.config.image)
        .context("building image definition from config")?;

    if output.as_deref() == Some(Path::new("-")) {
        print!("{}", render_dockerfile(&image));
        return Ok(());
    }

    let path = output.unwrap_or_else(|| loaded.dockerfile_path());

    if check {
        check_dockerfile(&image, &path)?;
        println!("[render] {} up to date", path.display());
        return Ok(());
    }

    match write_dockerfile(&image, &path)? {
        WriteOutcome::Written => println!("[render] wrote {}", path.display()),
        WriteOutcome::Unchanged => println!("[render] {} up to date", path.display()),
    }
    Ok(())
}

pub(crate) fn print_tags(loaded: &LoadedConfig) -> Result<()> {
    let manifest = PackageManifest::load(&loaded.manifest_path())?;
    let publish = &loaded.config.publish;
    let tags = TagSet::compute(&publish.registry, &publish.owner, &manifest)?;
    for tag in tags.as_vec() {
        println!("{tag}");
    }
    Ok(())
}

pub(crate) fn list_receipts(loaded: &LoadedConfig, latest: bool) -> Result<()> {
    let receipts_dir = loaded.receipts_dir();

    if latest {
        let Some(receipt) = latest_receipt(&receipts_dir)? else {
            println!("[receipts] none under {}", receipts_dir.display());
            return Ok(());
        };
        println!("{}", serde_json::to_string_pretty(&receipt)?);
        return Ok(());
    }

    let receipts = load_receipts(&receipts_dir)?;
    if receipts.is_empty() {
        println!("[receipts] none under {}", receipts_dir.display());
    }
    for receipt in receipts {
        println!(
            "{}  {}  {}  builder {} ({})",
            receipt.published_at,
            receipt.version,
            receipt.tags.join(" "),
            receipt.builder,
            receipt.builder_outcome
        );
    }
    Ok(())
}

mod workflows;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image_builder::LoadedConfig;

/// Build and publish the multi-arch LLM server container image.
#[derive(Parser)]
#[command(name = "image-builder")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the config file (default: ./image.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the Dockerfile, ensure the builder, build and push both tags
    Publish {
        /// Print mutating commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the tags the next publish would push
    Tags,

    /// Render the image definition to a Dockerfile
    Render {
        /// Output path, or `-` for stdout (default: configured dockerfile)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fail if the Dockerfile on disk is out of date instead of writing
        #[arg(long, conflicts_with = "output")]
        check: bool,
    },

    /// Create the multi-platform buildx builder if it is missing
    Builder,

    /// Check that docker and buildx are available
    Preflight,

    /// List publish receipts, newest first
    Receipts {
        /// Print only the most recent receipt as JSON
        #[arg(long)]
        latest: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    image_builder::logging::init(cli.verbose)?;

    let cwd = std::env::current_dir().context("resolving current directory")?;
    let loaded = LoadedConfig::load(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Publish { dry_run } => workflows::publish(&loaded, dry_run),
        Commands::Tags => workflows::print_tags(&loaded),
        Commands::Render { output, check } => workflows::render(&loaded, output, check),
        Commands::Builder => workflows::ensure_builder(&loaded),
        Commands::Preflight => workflows::preflight(),
        Commands::Receipts { latest } => workflows::list_receipts(&loaded, latest),
    }
}

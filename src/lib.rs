//! Build and publish the multi-architecture LLM server container image.
//!
//! The image runs a pre-built third-party model server CLI: the daemon is
//! brought up and the server listens on port 1234 on all interfaces. This
//! crate does not implement the server; it describes the image and drives
//! the external build tool.
//!
//! - **Image definition** - [`image::ImageDefinition`], an ordered list of
//!   provisioning steps rendered to a `Dockerfile`
//! - **Tags** - `<registry>/<owner>/<name>:latest` and `:<version>` from the
//!   package manifest
//! - **Builder** - a named `docker buildx` builder, created once if missing
//! - **Publish** - one multi-platform `docker buildx build --push`
//!
//! # Architecture
//!
//! ```text
//! image.toml ──► config ──┬──► image ──► Dockerfile
//!                         │
//! package.json ► manifest ┴──► tags ──► publish ──► buildx ──► docker
//!                                          │
//!                                          └──► receipts
//! ```

pub mod buildx;
pub mod config;
pub mod image;
pub mod logging;
pub mod manifest;
pub mod preflight;
pub mod process;
pub mod publish;
pub mod receipts;
pub mod tags;

pub use config::{Config, LoadedConfig};
pub use image::{ImageDefinition, Step};
pub use manifest::PackageManifest;
pub use publish::{publish, PublishOutcome, PublishPlan, PublishReport};
pub use tags::TagSet;

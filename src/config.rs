//! `image.toml` configuration.
//!
//! Every field has a default, so a missing config file (or an empty one)
//! describes the stock LLM server image published to
//! `ghcr.io/raine-works/<name>`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "image.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub publish: PublishConfig,
    pub image: ImageConfig,
}

/// Where and how the image is built and pushed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub registry: String,
    pub owner: String,
    pub platforms: Vec<String>,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub manifest: PathBuf,
    pub builder: String,
    pub builder_driver: String,
    pub receipts_dir: PathBuf,
    /// Defaults to `<user cache dir>/image-builder/locks`.
    pub lock_dir: Option<PathBuf>,
    /// Value for the `org.opencontainers.image.source` label.
    pub source: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            registry: "ghcr.io".to_string(),
            owner: "raine-works".to_string(),
            platforms: vec!["linux/amd64".to_string(), "linux/arm64".to_string()],
            dockerfile: PathBuf::from("Dockerfile"),
            context: PathBuf::from("."),
            manifest: PathBuf::from("package.json"),
            builder: "multiplatform".to_string(),
            builder_driver: "docker-container".to_string(),
            receipts_dir: PathBuf::from(".artifacts/publish"),
            lock_dir: None,
            source: None,
        }
    }
}

impl PublishConfig {
    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("image-builder")
                .join("locks")
        })
    }
}

/// Contents of the image itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    pub base: String,
    pub packages: Vec<String>,
    pub install_script: String,
    pub symlink: Option<SymlinkConfig>,
    pub bootstrap: Vec<String>,
    pub path_prepend: Option<String>,
    /// Sets `APPIMAGE_EXTRACT_AND_RUN=1` so the installed AppImage runs
    /// without FUSE inside the container.
    pub extract_and_run: bool,
    pub env: BTreeMap<String, String>,
    pub port: u16,
    pub server: ServerConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base: "ubuntu:22.04".to_string(),
            packages: vec![
                "ca-certificates".to_string(),
                "curl".to_string(),
                "libgomp1".to_string(),
            ],
            install_script: "https://lmstudio.ai/install.sh".to_string(),
            symlink: Some(SymlinkConfig {
                link: "/usr/local/bin/lms".to_string(),
                target: "/root/.lmstudio/bin/lms".to_string(),
            }),
            bootstrap: vec!["lms bootstrap".to_string()],
            path_prepend: Some("/root/.lmstudio/bin".to_string()),
            extract_and_run: true,
            env: BTreeMap::new(),
            port: 1234,
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SymlinkConfig {
    pub link: String,
    pub target: String,
}

/// Startup command of the container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub binary: String,
    pub bind: String,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary: "lms".to_string(),
            bind: "0.0.0.0".to_string(),
            cors: true,
        }
    }
}

/// A parsed config together with the directory its relative paths are
/// resolved against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub base_dir: PathBuf,
}

impl LoadedConfig {
    /// Load `explicit` if given (it must exist), else `image.toml` in `cwd`
    /// if present, else defaults rooted at `cwd`.
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => resolve_path(cwd, path),
            None => {
                let candidate = cwd.join(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    tracing::debug!(
                        cwd = %cwd.display(),
                        "no {DEFAULT_CONFIG_FILE} found, using defaults"
                    );
                    return Ok(Self {
                        config: Config::default(),
                        base_dir: cwd.to_path_buf(),
                    });
                }
                candidate
            }
        };

        let config = Config::from_path(&path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        Ok(Self { config, base_dir })
    }

    pub fn dockerfile_path(&self) -> PathBuf {
        resolve_path(&self.base_dir, &self.config.publish.dockerfile)
    }

    pub fn context_dir(&self) -> PathBuf {
        resolve_path(&self.base_dir, &self.config.publish.context)
    }

    pub fn manifest_path(&self) -> PathBuf {
        resolve_path(&self.base_dir, &self.config.publish.manifest)
    }

    pub fn receipts_dir(&self) -> PathBuf {
        resolve_path(&self.base_dir, &self.config.publish.receipts_dir)
    }

    pub fn lock_dir(&self) -> PathBuf {
        resolve_path(&self.base_dir, &self.config.publish.lock_dir())
    }
}

impl Config {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config '{}'", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config '{}'", path.display()))
    }
}

pub(crate) fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.publish.registry, "ghcr.io");
        assert_eq!(config.publish.owner, "raine-works");
        assert_eq!(config.publish.platforms, vec!["linux/amd64", "linux/arm64"]);
        assert_eq!(config.image.port, 1234);
        assert_eq!(config.image.server.bind, "0.0.0.0");
    }

    #[test]
    fn repository_config_spells_out_the_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_FILE);
        assert_eq!(Config::from_path(&path).unwrap(), Config::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [publish]
            owner = "someone"

            [image.server]
            cors = false
            "#,
        )
        .unwrap();

        assert_eq!(config.publish.owner, "someone");
        assert_eq!(config.publish.registry, "ghcr.io");
        assert!(!config.image.server.cors);
        assert_eq!(config.image.server.binary, "lms");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<Config, _> = toml::from_str("[publish]\nregistery = \"docker.io\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn missing_default_config_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let loaded = LoadedConfig::load(None, tmp.path()).unwrap();
        assert_eq!(loaded.config, Config::default());
        assert_eq!(loaded.manifest_path(), tmp.path().join("package.json"));
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(LoadedConfig::load(Some(Path::new("nope.toml")), tmp.path()).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let tmp = TempDir::new().unwrap();
        let conf_dir = tmp.path().join("deploy");
        fs::create_dir_all(&conf_dir).unwrap();
        fs::write(
            conf_dir.join("image.toml"),
            "[publish]\ndockerfile = \"docker/Dockerfile\"\nlock_dir = \"/var/lock/ib\"\n",
        )
        .unwrap();

        let loaded = LoadedConfig::load(Some(Path::new("deploy/image.toml")), tmp.path()).unwrap();
        assert_eq!(loaded.dockerfile_path(), conf_dir.join("docker/Dockerfile"));
        assert_eq!(loaded.context_dir(), conf_dir.join("."));
        assert_eq!(loaded.lock_dir(), PathBuf::from("/var/lock/ib"));
    }
}

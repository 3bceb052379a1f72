//! Package manifest loading.
//!
//! The published image takes its name and version from a package manifest:
//! top-level `name`/`version` in a `.json` file (package.json) or the
//! `[package]` table of a `.toml` file (Cargo.toml).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Name and version read from a package manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct CargoToml {
    #[serde(default)]
    package: Option<PackageManifest>,
}

impl PackageManifest {
    /// Read and validate the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading package manifest '{}'", path.display()))?;

        let manifest = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("toml") => Self::from_toml_str(&raw),
            _ => bail!(
                "unsupported package manifest '{}': expected a .json or .toml file",
                path.display()
            ),
        }
        .with_context(|| format!("parsing package manifest '{}'", path.display()))?;

        manifest
            .validate()
            .with_context(|| format!("validating package manifest '{}'", path.display()))?;
        Ok(manifest)
    }

    /// Parse without validating. Missing fields become empty strings.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parse the `[package]` table without validating.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let parsed: CargoToml = toml::from_str(raw)?;
        Ok(parsed.package.unwrap_or(Self {
            name: String::new(),
            version: String::new(),
        }))
    }

    /// Both fields must be present and non-blank.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("package manifest field 'name' is missing or empty");
        }
        if self.version.trim().is_empty() {
            bail!("package manifest field 'version' is missing or empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_package_json() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("package.json");
        fs::write(
            &path,
            r#"{ "name": "foo", "version": "1.2.3", "private": true, "scripts": {} }"#,
        )
        .unwrap();

        let manifest = PackageManifest::load(&path).unwrap();
        assert_eq!(manifest.name, "foo");
        assert_eq!(manifest.version, "1.2.3");
    }

    #[test]
    fn load_cargo_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Cargo.toml");
        fs::write(
            &path,
            "[package]\nname = \"foo\"\nversion = \"0.4.0\"\nedition = \"2021\"\n\n[dependencies]\n",
        )
        .unwrap();

        let manifest = PackageManifest::load(&path).unwrap();
        assert_eq!(manifest.name, "foo");
        assert_eq!(manifest.version, "0.4.0");
    }

    #[test]
    fn missing_version_parses_as_empty() {
        let manifest = PackageManifest::from_json_str(r#"{ "name": "foo" }"#).unwrap();
        assert_eq!(manifest.version, "");
    }

    #[test]
    fn missing_version_is_rejected_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("package.json");
        fs::write(&path, r#"{ "name": "foo" }"#).unwrap();

        let err = format!("{:#}", PackageManifest::load(&path).unwrap_err());
        assert!(err.contains("'version' is missing or empty"), "{err}");
    }

    #[test]
    fn blank_name_is_rejected() {
        let manifest = PackageManifest {
            name: "  ".into(),
            version: "1.0.0".into(),
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn toml_without_package_table_is_rejected() {
        let manifest = PackageManifest::from_toml_str("[workspace]\nmembers = []\n").unwrap();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("manifest.yaml");
        fs::write(&path, "name: foo\n").unwrap();
        assert!(PackageManifest::load(&path).is_err());
    }
}

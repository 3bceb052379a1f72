//! Image references and the tag pair attached to every publish.

use anyhow::{bail, Result};
use std::fmt;

use crate::manifest::PackageManifest;

/// Tag that always points at the most recent publish.
pub const LATEST_TAG: &str = "latest";

/// Longest tag the registry reference grammar accepts.
const MAX_TAG_LEN: usize = 128;

/// `registry/owner/name`, without a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRepository {
    pub registry: String,
    pub owner: String,
    pub name: String,
}

impl ImageRepository {
    pub fn new(registry: &str, owner: &str, name: &str) -> Result<Self> {
        if registry.trim().is_empty() {
            bail!("registry must not be empty");
        }
        if registry.contains('/') || registry.contains(char::is_whitespace) {
            bail!("invalid registry host '{registry}'");
        }
        validate_path_component(owner, "owner")?;
        validate_path_component(name, "image name")?;

        Ok(Self {
            registry: registry.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Full reference for `tag`.
    pub fn tagged(&self, tag: &str) -> Result<String> {
        validate_tag(tag)?;
        Ok(format!("{self}:{tag}"))
    }
}

impl fmt::Display for ImageRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.registry, self.owner, self.name)
    }
}

/// The `:latest` and `:<version>` references for one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    pub latest: String,
    pub versioned: String,
}

impl TagSet {
    /// Compute both tags for `manifest` under `registry/owner`.
    pub fn compute(registry: &str, owner: &str, manifest: &PackageManifest) -> Result<Self> {
        manifest.validate()?;
        let repository = ImageRepository::new(registry, owner, &manifest.name)?;
        Ok(Self {
            latest: repository.tagged(LATEST_TAG)?,
            versioned: repository.tagged(&manifest.version)?,
        })
    }

    /// `[latest, versioned]`.
    pub fn as_vec(&self) -> Vec<String> {
        vec![self.latest.clone(), self.versioned.clone()]
    }
}

/// `[a-z0-9]+((\.|_|__|-+)[a-z0-9]+)*`
fn validate_path_component(value: &str, field: &str) -> Result<()> {
    if !is_path_component(value.as_bytes()) {
        bail!(
            "invalid {field} '{value}': must be lowercase alphanumerics separated by '.', '_', '__' or dashes"
        );
    }
    Ok(())
}

fn is_path_component(bytes: &[u8]) -> bool {
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let mut rest = bytes;
    loop {
        let run = rest.iter().take_while(|&&b| alnum(b)).count();
        if run == 0 {
            return false;
        }
        rest = &rest[run..];

        let separator = match rest {
            [] => return true,
            [b'_', b'_', ..] => 2,
            [b'.' | b'_', ..] => 1,
            [b'-', ..] => rest.iter().take_while(|&&b| b == b'-').count(),
            _ => return false,
        };
        rest = &rest[separator..];
    }
}

/// `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first_ok || !rest_ok || tag.len() > MAX_TAG_LEN {
        bail!(
            "invalid image tag '{tag}': must match [A-Za-z0-9_][A-Za-z0-9_.-]{{0,127}}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str, version: &str) -> PackageManifest {
        PackageManifest {
            name: name.into(),
            version: version.into(),
        }
    }

    #[test]
    fn computes_latest_and_versioned_tags() {
        let tags = TagSet::compute("ghcr.io", "raine-works", &manifest("foo", "1.2.3")).unwrap();
        assert_eq!(tags.latest, "ghcr.io/raine-works/foo:latest");
        assert_eq!(tags.versioned, "ghcr.io/raine-works/foo:1.2.3");
        assert_eq!(
            tags.as_vec(),
            vec![
                "ghcr.io/raine-works/foo:latest",
                "ghcr.io/raine-works/foo:1.2.3"
            ]
        );
    }

    #[test]
    fn empty_version_is_rejected() {
        let err = TagSet::compute("ghcr.io", "raine-works", &manifest("foo", ""))
            .unwrap_err()
            .to_string();
        assert!(err.contains("version"), "{err}");
    }

    #[test]
    fn build_metadata_is_not_a_valid_tag() {
        assert!(TagSet::compute("ghcr.io", "raine-works", &manifest("foo", "1.2.3+abc")).is_err());
    }

    #[test]
    fn prerelease_versions_are_valid_tags() {
        let tags =
            TagSet::compute("ghcr.io", "raine-works", &manifest("foo", "2.0.0-rc.1")).unwrap();
        assert_eq!(tags.versioned, "ghcr.io/raine-works/foo:2.0.0-rc.1");
    }

    #[test]
    fn uppercase_and_scoped_names_are_rejected() {
        assert!(ImageRepository::new("ghcr.io", "raine-works", "Foo").is_err());
        assert!(ImageRepository::new("ghcr.io", "raine-works", "@scope/foo").is_err());
        assert!(ImageRepository::new("ghcr.io", "raine-works", "foo-bar_v2.x").is_ok());
        assert!(ImageRepository::new("ghcr.io", "raine-works", "foo-").is_err());
        assert!(ImageRepository::new("ghcr.io", "raine-works", "_foo").is_err());
    }

    #[test]
    fn double_underscore_and_dash_runs_are_separators() {
        for name in ["foo__bar", "foo--bar", "foo---bar", "a.b_c__d-e"] {
            assert!(
                ImageRepository::new("ghcr.io", "raine-works", name).is_ok(),
                "{name}"
            );
        }
        for name in ["foo___bar", "foo..bar", "foo_.bar", "foo__", "foo-.bar"] {
            assert!(
                ImageRepository::new("ghcr.io", "raine-works", name).is_err(),
                "{name}"
            );
        }
    }

    #[test]
    fn registry_with_port_is_accepted() {
        let repo = ImageRepository::new("localhost:5000", "me", "foo").unwrap();
        assert_eq!(repo.tagged("latest").unwrap(), "localhost:5000/me/foo:latest");
    }

    #[test]
    fn overlong_tag_is_rejected() {
        let repo = ImageRepository::new("ghcr.io", "me", "foo").unwrap();
        assert!(repo.tagged(&"a".repeat(129)).is_err());
        assert!(repo.tagged(&"a".repeat(128)).is_ok());
    }
}

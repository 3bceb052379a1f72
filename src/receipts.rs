//! Publish receipts: one JSON file per published version, written only
//! after the push succeeded.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Record of one successful publish, stored as
/// `<receipts_dir>/<name>-<version>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub name: String,
    pub version: String,
    pub tags: Vec<String>,
    pub platforms: Vec<String>,
    pub builder: String,
    pub builder_outcome: String,
    pub dockerfile_sha256: String,
    /// RFC 3339, UTC, whole seconds.
    pub published_at: String,
}

pub fn receipt_path(receipts_dir: &Path, name: &str, version: &str) -> PathBuf {
    receipts_dir.join(format!("{name}-{version}.json"))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn write_receipt(receipts_dir: &Path, receipt: &PublishReceipt) -> Result<PathBuf> {
    fs::create_dir_all(receipts_dir).with_context(|| {
        format!(
            "creating receipts directory '{}'",
            receipts_dir.display()
        )
    })?;
    let path = receipt_path(receipts_dir, &receipt.name, &receipt.version);
    let json = serde_json::to_vec_pretty(receipt).context("serializing publish receipt")?;
    fs::write(&path, json)
        .with_context(|| format!("writing publish receipt '{}'", path.display()))?;
    Ok(path)
}

/// All receipts under `receipts_dir`, newest first. A missing directory
/// has no receipts.
pub fn load_receipts(receipts_dir: &Path) -> Result<Vec<PublishReceipt>> {
    if !receipts_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut receipts = Vec::new();
    for entry in fs::read_dir(receipts_dir).with_context(|| {
        format!(
            "reading receipts directory '{}'",
            receipts_dir.display()
        )
    })? {
        let entry = entry.with_context(|| {
            format!(
                "iterating receipts directory '{}'",
                receipts_dir.display()
            )
        })?;
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("reading publish receipt '{}'", path.display()))?;
        let parsed: PublishReceipt = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing publish receipt '{}'", path.display()))?;
        receipts.push(parsed);
    }
    receipts.sort_by_key(|receipt| Reverse(receipt.published_at.clone()));
    Ok(receipts)
}

pub fn latest_receipt(receipts_dir: &Path) -> Result<Option<PublishReceipt>> {
    Ok(load_receipts(receipts_dir)?.into_iter().next())
}

//! Per-builder advisory lock.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive lock on `<lock_dir>/builder-<name>.lock`, released on drop.
#[derive(Debug)]
pub struct BuilderLock {
    file: File,
    path: PathBuf,
}

impl BuilderLock {
    /// Block until the lock for `builder` is held.
    pub fn acquire(lock_dir: &Path, builder: &str) -> Result<Self> {
        if builder.is_empty() || builder.contains(['/', '\\']) || builder.starts_with('.') {
            bail!("invalid builder name '{builder}'");
        }

        fs::create_dir_all(lock_dir)
            .with_context(|| format!("creating lock directory '{}'", lock_dir.display()))?;
        let path = lock_dir.join(format!("builder-{builder}.lock"));

        // The lock file is never unlinked: removing a file another process
        // still holds would let a third process lock a fresh inode.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening lock file '{}'", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            tracing::info!(
                lock = %path.display(),
                "another publish holds the builder lock, waiting"
            );
            file.lock_exclusive()
                .with_context(|| format!("locking '{}'", path.display()))?;
        }

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuilderLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let tmp = TempDir::new().unwrap();
        let lock = BuilderLock::acquire(tmp.path(), "multiplatform").unwrap();
        assert_eq!(lock.path(), tmp.path().join("builder-multiplatform.lock"));

        let other = File::open(lock.path()).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(lock);
        assert!(other.try_lock_exclusive().is_ok());
    }

    #[test]
    fn rejects_path_like_names() {
        let tmp = TempDir::new().unwrap();
        assert!(BuilderLock::acquire(tmp.path(), "../escape").is_err());
        assert!(BuilderLock::acquire(tmp.path(), "").is_err());
    }
}

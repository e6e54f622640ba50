//! Single-writer guard for the download cache.
//!
//! A run holds an exclusive `flock` on `meta.lock` for as long as its
//! fetcher lives. The kernel drops the lock when the process exits, so a
//! crashed run never leaves the cache locked.

use crate::core::error::Error;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "meta.lock";

/// Held lock on a cache directory. Unlocks on drop.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Lock `cache_dir` or fail with [`Error::CacheLocked`] without waiting.
    pub fn acquire(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("cannot open {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            return Err(Error::CacheLocked {
                path: cache_dir.display().to_string(),
            }
            .into());
        }
        tracing::debug!(path = %path.display(), "cache locked");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::debug!(path = %self.path.display(), error = %e, "cache unlock failed");
        }
    }
}

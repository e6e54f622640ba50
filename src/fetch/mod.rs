//! Download and extraction cache
//!
//! Artifacts are keyed by source URL and cached under
//! `<project>/data/download_cache/<basename>`. `meta.json` records, per URL,
//! whether the download completed, the checksum it was verified against and
//! whether it has been extracted. A fetch consults that record first, so
//! re-running a phase does no redundant network or extraction work:
//!
//! ```text
//! fetch(resource)
//!   checksum changed since last download?  -> drop file and record
//!   file already cached?                   -> skip download
//!   else download into temp/, verify, move into place, record
//!   extract_dir set and not yet extracted? -> extract, record
//! ```
//!
//! A failed download or checksum mismatch leaves neither a cached file nor a
//! "downloaded" record behind.

pub mod download;
pub mod extract;
pub mod hash;
pub mod metadata;
pub mod resource;

pub use download::{Downloader, HttpDownloader};
pub use hash::{Checksum, HashAlgorithm};
pub use metadata::{CacheEntry, MetadataStore};
pub use resource::Resource;

use crate::core::context::RunEnv;
use crate::core::error::Error;
use crate::core::lock::CacheLock;
use crate::core::output;
use crate::helpers::fs::{make_dirs_as_project_owner, maybe_unlink};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Scratch directory for in-flight downloads, relative to the cache.
const TEMP_DIR: &str = "temp";

/// The resource fetch cache. Holds the cache lock for its whole lifetime.
pub struct Fetcher {
    project_dir: PathBuf,
    cache_dir: PathBuf,
    temp_dir: PathBuf,
    store: MetadataStore,
    downloader: Box<dyn Downloader>,
    _lock: CacheLock,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("cache_dir", &self.cache_dir)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Open the cache for `env`, downloading over HTTP.
    pub fn open(env: &RunEnv) -> Result<Self> {
        make_dirs_as_project_owner(&env.project_dir, &env.cache_dir())?;
        Self::with_downloader(
            &env.project_dir,
            &env.cache_dir(),
            Box::new(HttpDownloader::from_env()),
        )
    }

    /// Open a cache at `cache_dir` with a custom downloader.
    pub fn with_downloader(
        project_dir: &Path,
        cache_dir: &Path,
        downloader: Box<dyn Downloader>,
    ) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .with_context(|| format!("cannot create cache directory {}", cache_dir.display()))?;
        let lock = CacheLock::acquire(cache_dir)?;
        let store = MetadataStore::load(cache_dir)?;
        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            cache_dir: cache_dir.to_path_buf(),
            temp_dir: cache_dir.join(TEMP_DIR),
            store,
            downloader,
            _lock: lock,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Recorded state for a URL, if any.
    pub fn entry(&self, url: &str) -> Option<&CacheEntry> {
        self.store.get(url)
    }

    /// Where `resource` is (or would be) cached.
    pub fn locate(&self, resource: &Resource) -> PathBuf {
        self.cache_dir.join(resource.filename())
    }

    /// Ensure `resource` is downloaded, verified and, if requested, extracted.
    pub fn fetch(&mut self, resource: &Resource) -> Result<()> {
        tracing::debug!(url = %resource.url, "fetching");
        resource.check_filename()?;
        let expected = resource
            .checksum
            .as_deref()
            .map(Checksum::parse)
            .transpose()?;
        let target = self.locate(resource);

        self.download(resource, &target, expected.as_ref())?;
        if let Some(extract_dir) = &resource.extract_dir {
            self.extract(resource, &target, extract_dir)?;
        }
        Ok(())
    }

    /// Remove a downloaded resource from the cache and forget it.
    pub fn clean(&mut self, resource: &Resource) -> Result<()> {
        if resource.extract_dir.is_some() {
            return Err(Error::CleanExtractedUnsupported {
                url: resource.url.clone(),
            }
            .into());
        }
        resource.check_filename()?;
        let target = self.locate(resource);
        if maybe_unlink(&target)? {
            output::sub_action(&format!("removed {}", resource.filename()));
        }
        if self.store.remove(&resource.url).is_some() {
            self.store.flush()?;
        }
        Ok(())
    }

    fn download(&mut self, resource: &Resource, target: &Path, expected: Option<&Checksum>) -> Result<()> {
        let url = resource.url.as_str();

        if let Some(expected) = expected
            && let Some(entry) = self.store.get(url)
            && entry.downloaded
            && entry.checksum.as_deref() != Some(expected.to_string().as_str())
        {
            output::info(&format!("checksum changed for {}, downloading again", resource.filename()));
            tracing::info!(url, recorded = ?entry.checksum, expected = %expected, "checksum changed");
            self.store.remove(url);
            self.store.flush()?;
            maybe_unlink(target)?;
        }

        if target.is_file() {
            tracing::debug!(path = %target.display(), "already downloaded");
            return Ok(());
        }

        output::sub_action(&format!("downloading {}", resource.filename()));
        self.reset_temp_dir()?;
        let result = self.download_verified(resource, target, expected);
        let cleanup = std::fs::remove_dir_all(&self.temp_dir);
        let actual = result?;
        if let Err(e) = cleanup {
            tracing::warn!(path = %self.temp_dir.display(), error = %e, "cannot remove scratch directory");
        }

        let entry = self.store.entry_mut(url);
        entry.downloaded = true;
        entry.checksum = actual.map(|sum| sum.to_string());
        entry.extracted = false;
        self.store.flush()
    }

    /// Download into the scratch directory, verify, then move into place.
    fn download_verified(
        &self,
        resource: &Resource,
        target: &Path,
        expected: Option<&Checksum>,
    ) -> Result<Option<Checksum>> {
        let scratch = self.temp_dir.join(resource.filename());
        self.downloader.download(&resource.url, &scratch)?;

        let actual = match expected {
            Some(expected) => {
                let actual = Checksum::of_file(&scratch, expected.algorithm)?;
                if actual != *expected {
                    return Err(Error::ChecksumMismatch {
                        url: resource.url.clone(),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    }
                    .into());
                }
                Some(actual)
            }
            None => None,
        };

        std::fs::rename(&scratch, target)
            .with_context(|| format!("cannot move download to {}", target.display()))?;
        Ok(actual)
    }

    fn extract(&mut self, resource: &Resource, target: &Path, extract_dir: &Path) -> Result<()> {
        let url = resource.url.as_str();
        if self.store.get(url).is_some_and(|e| e.extracted) {
            tracing::debug!(url, "already extracted");
            return Ok(());
        }

        let dest = self.project_dir.join(extract_dir);
        output::sub_action(&format!("extracting {} to {}", resource.filename(), extract_dir.display()));
        extract::extract(target, &dest)?;

        let entry = self.store.entry_mut(url);
        entry.downloaded = true;
        entry.extracted = true;
        self.store.flush()
    }

    fn reset_temp_dir(&self) -> Result<()> {
        if self.temp_dir.exists() {
            std::fs::remove_dir_all(&self.temp_dir)
                .with_context(|| format!("cannot clear {}", self.temp_dir.display()))?;
        }
        std::fs::create_dir_all(&self.temp_dir)
            .with_context(|| format!("cannot create {}", self.temp_dir.display()))
    }
}

//! Downloadable artifacts.

use crate::core::error::Error;
use std::fmt;
use std::path::PathBuf;

/// An artifact identified by its source URL, with optional extraction target
/// (relative to the project directory) and expected checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub url: String,
    pub extract_dir: Option<PathBuf>,
    pub checksum: Option<String>,
}

impl Resource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extract_dir: None,
            checksum: None,
        }
    }

    /// Extract into `dir` (relative to the project directory) after download.
    pub fn extract_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extract_dir = Some(dir.into());
        self
    }

    pub fn checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Last path segment of the URL, used as the cached file name.
    pub fn filename(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.rsplit('/').next().unwrap_or(path)
    }

    /// Fails unless [`Resource::filename`] names a file inside the cache.
    pub fn check_filename(&self) -> Result<&str, Error> {
        match self.filename() {
            "" | "." | ".." => Err(Error::NoFileName {
                url: self.url.clone(),
            }),
            name => Ok(name),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

//! Persistent download cache metadata
//!
//! One entry per source URL, stored as JSON in `meta.json`. Missing fields
//! read as their defaults and unknown fields are ignored, so older and newer
//! metadata files stay loadable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const METADATA_FILE: &str = "meta.json";

/// What is known about one cached URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub extracted: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

/// In-memory view of `meta.json`, written back on [`MetadataStore::flush`].
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl MetadataStore {
    /// Load the store in `dir`, starting empty if the file does not exist.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file: MetadataFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            file.entries
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    pub fn entry_mut(&mut self, url: &str) -> &mut CacheEntry {
        self.entries.entry(url.to_string()).or_default()
    }

    pub fn remove(&mut self, url: &str) -> Option<CacheEntry> {
        self.entries.remove(url)
    }

    /// Write the store atomically (temp file in the same directory, then rename).
    pub fn flush(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("metadata path has no parent directory")?;
        let file = MetadataFile {
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MetadataStore::load(dir.path()).unwrap();
        assert!(store.get("http://example.org/a").is_none());
    }

    #[test]
    fn test_flush_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = MetadataStore::load(dir.path()).unwrap();
        let entry = store.entry_mut("http://example.org/a.tgz");
        entry.downloaded = true;
        entry.checksum = Some("abc".into());
        store.flush().unwrap();

        let store = MetadataStore::load(dir.path()).unwrap();
        let entry = store.get("http://example.org/a.tgz").unwrap();
        assert!(entry.downloaded);
        assert!(!entry.extracted);
        assert_eq!(entry.checksum.as_deref(), Some("abc"));
    }

    #[test]
    fn test_missing_and_unknown_fields_tolerated() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(METADATA_FILE),
            r#"{"entries": {"http://x/a": {"downloaded": true, "size": 12}}, "version": 3}"#,
        )
        .unwrap();
        let store = MetadataStore::load(dir.path()).unwrap();
        let entry = store.get("http://x/a").unwrap();
        assert!(entry.downloaded);
        assert_eq!(entry.checksum, None);
        assert!(!entry.extracted);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "not json").unwrap();
        assert!(MetadataStore::load(dir.path()).is_err());
    }
}

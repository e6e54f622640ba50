//! Subversion checkouts pinned to a revision.

use crate::helpers::cmd::{Cmd, CommandRunner};
use crate::helpers::fs::maybe_unlink;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// A working copy (or export) of `url` at `revision` in `dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnCheckout {
    pub url: String,
    pub revision: String,
    pub dir: PathBuf,
    /// Export instead of checkout. Exports are never re-validated.
    pub export: bool,
}

impl SvnCheckout {
    pub fn new(url: impl Into<String>, revision: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            revision: revision.into(),
            dir: dir.into(),
            export: false,
        }
    }

    pub fn export(mut self) -> Self {
        self.export = true;
        self
    }

    /// Checkout directory for `url` below `build_dir`, named after its last
    /// path segment.
    pub fn source_dir(build_dir: &Path, url: &str) -> PathBuf {
        build_dir.join(url.trim_end_matches('/').rsplit('/').next().unwrap_or(url))
    }

    /// True when the directory holds the pinned revision. A checkout at any
    /// other revision is deleted so it can be fetched again.
    pub fn is_checked_out(&self, runner: &dyn CommandRunner) -> Result<bool> {
        if !self.dir.is_dir() {
            return Ok(false);
        }
        if self.export {
            return Ok(true);
        }

        let actual = runner.output(&Cmd::new("svnversion").dir(&self.dir))?;
        if actual.trim() != self.revision {
            tracing::info!(
                dir = %self.dir.display(),
                expected = %self.revision,
                actual = actual.trim(),
                "checked out revision doesn't match, deleting checkout"
            );
            maybe_unlink(&self.dir)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Check out (or export) unless the pinned revision is already there.
    pub fn fetch(&self, runner: &dyn CommandRunner) -> Result<()> {
        if self.is_checked_out(runner)? {
            return Ok(());
        }
        let subcommand = if self.export { "export" } else { "co" };
        let cmd = Cmd::new("svn")
            .arg(subcommand)
            .arg("-r")
            .arg(&self.revision)
            .arg(&self.url)
            .arg(self.dir.to_string_lossy());
        tracing::info!(command = %cmd, "checking out");
        runner.run(&cmd)
    }
}

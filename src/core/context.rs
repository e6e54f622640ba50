//! Run environment shared by every unit in a run.

use crate::core::config::Config;
use std::path::{Path, PathBuf};

/// Operator-controlled switches for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Replace existing files when copying the project template.
    pub overwrite: bool,
    /// Stream external command output instead of capturing it.
    pub verbose: bool,
    /// Skip interactive confirmation prompts (`OSS_NON_INTERACTIVE`).
    pub non_interactive: bool,
    /// Let root run every phase (`OSS_ALLOW_ROOT_ALL_COMMANDS`).
    pub allow_root_all: bool,
}

impl RunOptions {
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn allow_root_all(mut self, allow: bool) -> Self {
        self.allow_root_all = allow;
        self
    }
}

/// Paths, configuration and options for one run.
#[derive(Debug, Clone)]
pub struct RunEnv {
    /// Directory the stack is provisioned into.
    pub project_dir: PathBuf,
    /// Directory holding `template/` and `patches/`.
    pub setup_dir: PathBuf,
    pub config: Config,
    pub options: RunOptions,
}

impl RunEnv {
    pub fn new(project_dir: impl Into<PathBuf>, setup_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            project_dir: project_dir.into(),
            setup_dir: setup_dir.into(),
            config,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// `<project>/build`, where sources are checked out and compiled.
    pub fn build_dir(&self) -> PathBuf {
        self.project_dir.join("build")
    }

    /// `<project>/data`.
    pub fn data_dir(&self) -> PathBuf {
        self.project_dir.join("data")
    }

    /// `<project>/data/download_cache`.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir().join("download_cache")
    }

    pub fn patches_dir(&self, name: &str) -> PathBuf {
        self.setup_dir.join("patches").join(name)
    }

    pub fn template_dir(&self) -> PathBuf {
        self.setup_dir.join("template")
    }

    /// Resolve a project-relative path.
    pub fn project_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.project_dir.join(rel)
    }
}

//! Osmosis, used to pull minutely replication diffs.

use super::{OSMOSIS, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{PhaseContext, Unit};
use crate::fetch::Resource;
use crate::helpers::cmd::Cmd;
use crate::helpers::fs::make_dirs_as_project_owner;
use crate::helpers::packages::install_packages;
use anyhow::Result;
use std::path::{Path, PathBuf};

const VERSION: &str = "0.39";

const ARCHIVE_URL: &str = "http://dev.openstreetmap.org/~bretth/osmosis-build/osmosis-latest.tgz";
const ARCHIVE_MD5: &str = "793a1cff312ed003e90ee090d77c33db";

#[derive(Debug)]
pub struct Osmosis {
    project_dir: PathBuf,
    work_dir: PathBuf,
    changes_file: PathBuf,
    binary: PathBuf,
}

impl Osmosis {
    const PHASES: &'static [Phase] = &[
        Phase::SystemSetup,
        Phase::Download,
        Phase::Build,
        Phase::ReadReplication,
    ];

    pub fn new(env: &RunEnv) -> Self {
        let work_dir = env.data_dir().join("osmosis");
        Self {
            project_dir: env.project_dir.clone(),
            changes_file: work_dir.join("changes.osm.gz"),
            work_dir,
            binary: env
                .build_dir()
                .join(format!("osmosis-{}", VERSION))
                .join("bin")
                .join("osmosis"),
        }
    }

    /// Change file written by `read_replication`.
    pub fn changes_file(&self) -> &Path {
        &self.changes_file
    }

    fn resources() -> Vec<Resource> {
        vec![Resource::new(ARCHIVE_URL).extract_to("build").checksum(ARCHIVE_MD5)]
    }

    fn osmosis(&self) -> Cmd {
        Cmd::new(self.binary.to_string_lossy())
    }

    fn working_dir_arg(&self) -> String {
        format!("workingDirectory={}", self.work_dir.display())
    }

    fn build(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        make_dirs_as_project_owner(&self.project_dir, &self.work_dir)?;
        if self.work_dir.join("configuration.txt").is_file() {
            output::skip("replication already initialized");
            return Ok(());
        }
        cx.runner.run(
            &self
                .osmosis()
                .arg("--read-replication-interval-init")
                .arg(self.working_dir_arg()),
        )
    }

    fn read_replication(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        cx.runner.run(
            &self
                .osmosis()
                .arg("--read-replication-interval")
                .arg(self.working_dir_arg())
                .arg("--simplify-change")
                .arg("--write-xml-change")
                .arg(self.changes_file.to_string_lossy()),
        )
    }
}

impl Unit for Osmosis {
    fn name(&self) -> &str {
        OSMOSIS
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::SystemSetup => install_packages(cx.runner, &["openjdk-6-jre"]),
            Phase::Download => cx.fetch_all(&Self::resources()),
            Phase::Build => self.build(cx),
            Phase::ReadReplication => self.read_replication(cx),
            _ => Ok(()),
        }
    }
}

//! Fakes shared by the integration tests: a recording command runner, an
//! in-memory downloader and a scriptable unit graph.

#![allow(dead_code)]

use anyhow::Result;
use osm_server_setup::core::privilege::Privilege;
use osm_server_setup::fetch::Downloader;
use osm_server_setup::helpers::cmd::{Cmd, CommandRunner};
use osm_server_setup::{
    Config, DependencySpec, Error, Executor, Fetcher, Phase, PhaseContext, RunEnv, Unit,
    UnitFactory,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

pub type Log = Rc<RefCell<Vec<String>>>;

/// Records every command instead of running it.
#[derive(Default)]
pub struct RecordingRunner {
    /// Commands passed to `run`, rendered with `Display`.
    pub runs: RefCell<Vec<Cmd>>,
    /// Commands passed to `succeeds`.
    pub probes: RefCell<Vec<Cmd>>,
    /// Answer for every probe.
    pub probe_result: bool,
    /// `run` fails for commands whose program contains this string.
    pub fail_program: Option<String>,
}

impl RecordingRunner {
    pub fn probing(result: bool) -> Self {
        Self {
            probe_result: result,
            ..Self::default()
        }
    }

    pub fn programs(&self) -> Vec<String> {
        self.runs
            .borrow()
            .iter()
            .map(|cmd| cmd.program().to_string())
            .collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &Cmd) -> Result<()> {
        self.runs.borrow_mut().push(cmd.clone());
        if let Some(fail) = &self.fail_program
            && cmd.program().contains(fail.as_str())
        {
            return Err(Error::CommandFailed {
                cmd: cmd.to_string(),
                code: Some(1),
            }
            .into());
        }
        Ok(())
    }

    fn succeeds(&self, cmd: &Cmd) -> Result<bool> {
        self.probes.borrow_mut().push(cmd.clone());
        Ok(self.probe_result)
    }

    fn output(&self, cmd: &Cmd) -> Result<String> {
        anyhow::bail!("no output recorded for {}", cmd)
    }
}

/// Serves bodies from memory and counts requests per URL.
#[derive(Clone, Default)]
pub struct MemoryDownloader {
    bodies: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    requests: Rc<RefCell<Vec<String>>>,
}

impl MemoryDownloader {
    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies.borrow_mut().insert(url.to_string(), body.to_vec());
    }

    pub fn requests(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|u| *u == url).count()
    }
}

impl Downloader for MemoryDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.requests.borrow_mut().push(url.to_string());
        let bodies = self.bodies.borrow();
        let Some(body) = bodies.get(url) else {
            anyhow::bail!("404 Not Found: {}", url);
        };
        std::fs::write(dest, body)?;
        Ok(body.len() as u64)
    }
}

/// A unit that appends `name:phase` to a shared log.
pub struct Step {
    pub name: String,
    pub deps: Vec<DependencySpec>,
    pub fail: bool,
    pub log: Log,
}

impl Unit for Step {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<DependencySpec> {
        self.deps.clone()
    }

    fn supports(&self, phase: Phase) -> bool {
        phase != Phase::Generate
    }

    fn run_phase(&mut self, phase: Phase, _cx: &mut PhaseContext<'_>) -> Result<()> {
        self.log.borrow_mut().push(format!("{}:{}", self.name, phase));
        if self.fail {
            anyhow::bail!("{} failed on purpose", self.name);
        }
        Ok(())
    }
}

/// Factory over a fixed `kind -> dependencies` table.
#[derive(Default)]
pub struct GraphFactory {
    pub edges: HashMap<String, Vec<String>>,
    pub roots: Vec<String>,
    pub failing: Option<String>,
    pub log: Log,
}

impl GraphFactory {
    pub fn new() -> Self {
        Self::default().node("core", &[])
    }

    pub fn node(mut self, kind: &str, deps: &[&str]) -> Self {
        self.edges
            .insert(kind.to_string(), deps.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn roots(mut self, roots: &[&str]) -> Self {
        self.roots = roots.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn failing(mut self, kind: &str) -> Self {
        self.failing = Some(kind.to_string());
        self
    }
}

impl UnitFactory for GraphFactory {
    fn create(&self, spec: &DependencySpec) -> Result<Box<dyn Unit>> {
        let Some(deps) = self.edges.get(&spec.kind) else {
            return Err(Error::UnknownKind {
                kind: spec.kind.clone(),
            }
            .into());
        };
        Ok(Box::new(Step {
            name: spec.unit_name(),
            deps: deps.iter().map(DependencySpec::of).collect(),
            fail: self.failing.as_deref() == Some(spec.kind.as_str()),
            log: self.log.clone(),
        }))
    }

    fn requested(&self) -> Vec<DependencySpec> {
        self.roots.iter().map(DependencySpec::of).collect()
    }
}

/// A scratch project directory with its environment.
pub struct Project {
    pub dir: TempDir,
    pub env: RunEnv,
}

impl Project {
    pub fn new(config: Config) -> Self {
        let dir = TempDir::new().unwrap();
        let env = RunEnv::new(dir.path(), dir.path().join("osm-server-setup"), config);
        Self { dir, env }
    }

    pub fn fetcher(&self, downloader: &MemoryDownloader) -> Fetcher {
        Fetcher::with_downloader(
            &self.env.project_dir,
            &self.env.cache_dir(),
            Box::new(downloader.clone()),
        )
        .unwrap()
    }

    /// Run `phase` as an unprivileged user (or root for privileged phases).
    pub fn run(
        &self,
        factory: &dyn UnitFactory,
        runner: &dyn CommandRunner,
        phase: Phase,
        only: Option<&str>,
    ) -> Result<osm_server_setup::core::executor::RunReport> {
        let mut fetcher = self.fetcher(&MemoryDownloader::default());
        let privilege = if phase.is_privileged() {
            Privilege::elevated()
        } else {
            Privilege::unprivileged()
        };
        Executor::new(&self.env, factory, runner)
            .with_privilege(privilege)
            .run(phase, only, &mut fetcher)
    }
}

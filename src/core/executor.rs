//! Phase executor
//!
//! Runs one lifecycle phase over the resolved unit list:
//!
//! 1. resolve the requested units (optionally narrowed to one) and prepend
//!    the core unit
//! 2. refuse to start if the process runs under the wrong account for the
//!    phase
//! 3. invoke the phase on every unit that supports it, in order, stopping
//!    at the first failure
//!
//! Nothing is retried or rolled back. Phases are written to be re-runnable,
//! so the remedy for a failure is to fix the cause and run the phase again.

use crate::core::context::RunEnv;
use crate::core::deps::Resolver;
use crate::core::error::Error;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::privilege::Privilege;
use crate::core::unit::{CORE_KIND, DependencySpec, PhaseContext, Unit, UnitFactory};
use crate::fetch::Fetcher;
use crate::helpers::cmd::CommandRunner;
use anyhow::Result;

/// What happened to each unit during a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Units whose phase ran, in order.
    pub ran: Vec<String>,
    /// Units that do not implement the phase.
    pub skipped: Vec<String>,
}

/// Drives units through a phase.
pub struct Executor<'a> {
    env: &'a RunEnv,
    factory: &'a dyn UnitFactory,
    runner: &'a dyn CommandRunner,
    privilege: Privilege,
}

impl<'a> Executor<'a> {
    pub fn new(env: &'a RunEnv, factory: &'a dyn UnitFactory, runner: &'a dyn CommandRunner) -> Self {
        Self {
            env,
            factory,
            runner,
            privilege: Privilege::current(),
        }
    }

    /// Override the detected process privilege.
    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    /// Execution list for a run: the core unit, then the resolved units.
    pub fn plan(&self, only: Option<&str>) -> Result<Vec<Box<dyn Unit>>> {
        let requested = self.factory.requested();
        tracing::debug!(?requested, "units to load");
        let resolved = Resolver::new(self.factory).resolve_specs(&requested, only)?;

        let mut units = Vec::with_capacity(resolved.len() + 1);
        units.push(self.factory.create(&DependencySpec::core())?);
        units.extend(resolved.into_iter().filter(|u| u.name() != CORE_KIND));
        tracing::debug!(?units, "all units");
        Ok(units)
    }

    /// Run `phase` over the execution list.
    pub fn run(&self, phase: Phase, only: Option<&str>, fetcher: &mut Fetcher) -> Result<RunReport> {
        let mut units = self.plan(only)?;
        self.privilege.check(phase, self.env.options.allow_root_all)?;

        output::action(&format!("Running {}", phase));
        let total = units.len();
        let mut report = RunReport::default();

        for index in 0..total {
            let (before, rest) = units.split_at_mut(index);
            let Some((unit, after)) = rest.split_first_mut() else {
                break;
            };

            if !unit.supports(phase) {
                tracing::debug!(unit = unit.name(), %phase, "phase not implemented, skipping");
                report.skipped.push(unit.name().to_string());
                continue;
            }

            output::action_numbered(index + 1, total, unit.name());
            tracing::info!(unit = unit.name(), %phase, "running phase");

            let mut cx = PhaseContext::new(self.env, fetcher, self.runner, before, after);
            if let Err(source) = unit.run_phase(phase, &mut cx) {
                tracing::debug!(unit = unit.name(), %phase, error = %source, "phase failed");
                return Err(Error::PhaseFailed {
                    unit: unit.name().to_string(),
                    phase: phase.to_string(),
                    source: source.into(),
                }
                .into());
            }
            report.ran.push(unit.name().to_string());
        }

        output::success(&format!("{} complete", phase));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::fetch::Downloader;
    use crate::helpers::cmd::Cmd;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Step {
        name: String,
        deps: Vec<DependencySpec>,
        phases: Vec<Phase>,
        fail: bool,
        log: Log,
    }

    impl Unit for Step {
        fn name(&self) -> &str {
            &self.name
        }
        fn dependencies(&self) -> Vec<DependencySpec> {
            self.deps.clone()
        }
        fn supports(&self, phase: Phase) -> bool {
            self.phases.contains(&phase)
        }
        fn run_phase(&mut self, phase: Phase, _cx: &mut PhaseContext<'_>) -> Result<()> {
            self.log.borrow_mut().push(format!("{}:{}", self.name, phase));
            if self.fail {
                anyhow::bail!("{} broke", self.name);
            }
            Ok(())
        }
    }

    struct Chain {
        fail: Option<&'static str>,
        log: Log,
    }

    impl UnitFactory for Chain {
        fn create(&self, spec: &DependencySpec) -> Result<Box<dyn Unit>> {
            let deps = match spec.kind.as_str() {
                "core" | "a" => vec![],
                "b" => vec![DependencySpec::of("a")],
                "c" => vec![DependencySpec::of("b")],
                "idle" => vec![],
                _ => return Err(Error::UnknownKind { kind: spec.kind.clone() }.into()),
            };
            let phases = if spec.kind == "idle" {
                vec![]
            } else {
                vec![Phase::Build, Phase::SystemSetup]
            };
            Ok(Box::new(Step {
                name: spec.unit_name(),
                deps,
                phases,
                fail: self.fail == Some(spec.kind.as_str()),
                log: self.log.clone(),
            }))
        }

        fn requested(&self) -> Vec<DependencySpec> {
            vec![DependencySpec::of("c"), DependencySpec::of("idle")]
        }
    }

    struct NoNetwork;

    impl Downloader for NoNetwork {
        fn download(&self, url: &str, _dest: &Path) -> Result<u64> {
            anyhow::bail!("network disabled: {}", url)
        }
    }

    struct NoCommands;

    impl CommandRunner for NoCommands {
        fn run(&self, cmd: &Cmd) -> Result<()> {
            anyhow::bail!("unexpected command: {}", cmd)
        }
        fn succeeds(&self, cmd: &Cmd) -> Result<bool> {
            anyhow::bail!("unexpected command: {}", cmd)
        }
        fn output(&self, cmd: &Cmd) -> Result<String> {
            anyhow::bail!("unexpected command: {}", cmd)
        }
    }

    fn setup(dir: &TempDir) -> (RunEnv, Fetcher) {
        let env = RunEnv::new(dir.path(), dir.path().join("setup"), Config::default());
        let fetcher =
            Fetcher::with_downloader(dir.path(), &env.cache_dir(), Box::new(NoNetwork)).unwrap();
        (env, fetcher)
    }

    #[test]
    fn test_plan_starts_with_core() {
        let dir = TempDir::new().unwrap();
        let (env, _fetcher) = setup(&dir);
        let factory = Chain { fail: None, log: Log::default() };
        let exec = Executor::new(&env, &factory, &NoCommands);
        let names = crate::core::deps::names(&exec.plan(None).unwrap());
        assert_eq!(names, vec!["core", "a", "b", "c", "idle"]);
    }

    #[test]
    fn test_run_in_order_and_skip_unsupported() {
        let dir = TempDir::new().unwrap();
        let (env, mut fetcher) = setup(&dir);
        let log = Log::default();
        let factory = Chain { fail: None, log: log.clone() };
        let report = Executor::new(&env, &factory, &NoCommands)
            .with_privilege(Privilege::unprivileged())
            .run(Phase::Build, None, &mut fetcher)
            .unwrap();
        assert_eq!(report.ran, vec!["core", "a", "b", "c"]);
        assert_eq!(report.skipped, vec!["idle"]);
        assert_eq!(*log.borrow(), vec!["core:build", "a:build", "b:build", "c:build"]);
    }

    #[test]
    fn test_first_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let (env, mut fetcher) = setup(&dir);
        let log = Log::default();
        let factory = Chain { fail: Some("a"), log: log.clone() };
        let err = Executor::new(&env, &factory, &NoCommands)
            .with_privilege(Privilege::unprivileged())
            .run(Phase::Build, None, &mut fetcher)
            .unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::PhaseFailed { unit, phase, .. }) => {
                assert_eq!(unit, "a");
                assert_eq!(phase, "build");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(*log.borrow(), vec!["core:build", "a:build"]);
    }

    #[test]
    fn test_privilege_checked_before_any_unit() {
        let dir = TempDir::new().unwrap();
        let (env, mut fetcher) = setup(&dir);
        let log = Log::default();
        let factory = Chain { fail: None, log: log.clone() };
        let err = Executor::new(&env, &factory, &NoCommands)
            .with_privilege(Privilege::unprivileged())
            .run(Phase::SystemSetup, None, &mut fetcher)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::RequiresElevation { .. })
        ));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_filtered_run() {
        let dir = TempDir::new().unwrap();
        let (env, mut fetcher) = setup(&dir);
        let log = Log::default();
        let factory = Chain { fail: None, log: log.clone() };
        let report = Executor::new(&env, &factory, &NoCommands)
            .with_privilege(Privilege::elevated())
            .run(Phase::SystemSetup, Some("b"), &mut fetcher)
            .unwrap();
        assert_eq!(report.ran, vec!["core", "a", "b"]);
    }
}

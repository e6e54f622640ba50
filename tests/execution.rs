//! Phase execution end to end over a scripted unit graph.

mod common;

use common::{GraphFactory, MemoryDownloader, Project, RecordingRunner};
use osm_server_setup::core::privilege::Privilege;
use osm_server_setup::{Config, Error, Executor, Phase};

fn chain() -> GraphFactory {
    GraphFactory::new()
        .node("a", &[])
        .node("b", &["a"])
        .node("c", &["b"])
        .roots(&["c"])
}

#[test]
fn test_chain_runs_core_first_then_dependencies() {
    let project = Project::new(Config::default());
    let factory = chain();
    let report = project
        .run(&factory, &RecordingRunner::default(), Phase::Build, None)
        .unwrap();

    assert_eq!(report.ran, vec!["core", "a", "b", "c"]);
    assert_eq!(
        *factory.log.borrow(),
        vec!["core:build", "a:build", "b:build", "c:build"]
    );
}

#[test]
fn test_failure_in_a_stops_b_and_c() {
    let project = Project::new(Config::default());
    let factory = chain().failing("a");
    let err = project
        .run(&factory, &RecordingRunner::default(), Phase::Build, None)
        .unwrap_err();

    match err.downcast_ref::<Error>() {
        Some(Error::PhaseFailed { unit, phase, source }) => {
            assert_eq!(unit, "a");
            assert_eq!(phase, "build");
            assert!(source.to_string().contains("failed on purpose"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(*factory.log.borrow(), vec!["core:build", "a:build"]);
}

#[test]
fn test_unsupported_phase_skips_every_unit() {
    let project = Project::new(Config::default());
    let factory = chain();
    let report = project
        .run(&factory, &RecordingRunner::default(), Phase::Generate, None)
        .unwrap();
    assert!(report.ran.is_empty());
    assert_eq!(report.skipped, vec!["core", "a", "b", "c"]);
}

#[test]
fn test_privileged_phase_needs_root() {
    let project = Project::new(Config::default());
    let factory = chain();
    let mut fetcher = project.fetcher(&MemoryDownloader::default());
    let err = Executor::new(&project.env, &factory, &RecordingRunner::default())
        .with_privilege(Privilege::unprivileged())
        .run(Phase::SystemSetupClean, None, &mut fetcher)
        .unwrap_err();
    let err = err.downcast_ref::<Error>().unwrap();
    assert!(matches!(err, Error::RequiresElevation { .. }));
    assert!(err.is_precondition());
    assert!(factory.log.borrow().is_empty());
}

#[test]
fn test_root_needs_override_for_other_phases() {
    let project = Project::new(Config::default());
    let factory = chain();
    let mut fetcher = project.fetcher(&MemoryDownloader::default());
    let err = Executor::new(&project.env, &factory, &RecordingRunner::default())
        .with_privilege(Privilege::elevated())
        .run(Phase::Download, None, &mut fetcher)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::ElevationForbidden { .. })
    ));
    assert!(factory.log.borrow().is_empty());
}

#[test]
fn test_root_with_override_runs_everything() {
    let mut project = Project::new(Config::default());
    project.env.options.allow_root_all = true;
    let factory = chain();
    let mut fetcher = project.fetcher(&MemoryDownloader::default());
    let report = Executor::new(&project.env, &factory, &RecordingRunner::default())
        .with_privilege(Privilege::elevated())
        .run(Phase::Download, Some("b"), &mut fetcher)
        .unwrap();
    assert_eq!(report.ran, vec!["core", "a", "b"]);
}

#[test]
fn test_resolution_errors_come_before_privilege_errors() {
    let project = Project::new(Config::default());
    let factory = chain();
    let mut fetcher = project.fetcher(&MemoryDownloader::default());
    let err = Executor::new(&project.env, &factory, &RecordingRunner::default())
        .with_privilege(Privilege::unprivileged())
        .run(Phase::SystemSetup, Some("nope"), &mut fetcher)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::UnitNotFound { .. })
    ));
}

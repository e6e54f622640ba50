//! Real bundles driven through the executor with commands recorded, not run.

mod common;

use common::{Project, RecordingRunner};
use osm_server_setup::bundles::BundleFactory;
use osm_server_setup::core::deps::names;
use osm_server_setup::{Config, Executor, Phase};

fn config() -> Config {
    Config {
        extent_osm: Some([661231.6, 5733929.8, 1173292.4, 6090514.2]),
        ..Config::default()
    }
}

#[test]
fn test_mapserver_plan() {
    let project = Project::new(config());
    let factory = BundleFactory::new(&project.env);
    let runner = RecordingRunner::default();
    let plan = Executor::new(&project.env, &factory, &runner)
        .plan(Some("mapserverconfig"))
        .unwrap();
    assert_eq!(
        names(&plan),
        vec![
            "core",
            "setupdatabase",
            "osm2pgsqlbuild",
            "osmdata_osm_mapserver",
            "mapserverbuild",
            "mapserverconfig",
        ]
    );
}

#[test]
fn test_fresh_import_runs_postprocess() {
    let project = Project::new(config());
    let factory = BundleFactory::new(&project.env);
    // every "table exists" probe fails
    let runner = RecordingRunner::probing(false);

    let report = project
        .run(&factory, &runner, Phase::LoadData, Some("mapserverconfig"))
        .unwrap();
    assert_eq!(report.ran, vec!["osmdata_osm_mapserver", "mapserverconfig"]);

    let runs = runner.runs.borrow();
    let osm2pgsql = runs
        .iter()
        .find(|cmd| cmd.program().ends_with("/osm2pgsql"))
        .expect("osm2pgsql ran");
    let args = osm2pgsql.get_args();
    assert!(args.windows(2).any(|w| w == ["-p", "osm_mapserver"]));
    assert!(args.windows(2).any(|w| w == ["--bbox", "5.94,45.7,10.54,47.9"]));
    assert!(args.iter().any(|a| a.ends_with("download_cache/switzerland.osm.bz2")));
    assert_eq!(osm2pgsql.get_env("PGPASSWORD"), Some("override-me"));

    let programs = runner.programs();
    let psql = programs.iter().position(|p| p == "psql").expect("postprocess.sql ran");
    let shp2img = programs
        .iter()
        .position(|p| p.ends_with("/shp2img"))
        .expect("shp2img ran");
    assert!(psql < shp2img);

    let shp2img = &runs[shp2img];
    assert!(shp2img.get_args().ends_with(&[
        "-e".to_string(),
        "661231".to_string(),
        "5733929".to_string(),
        "1173292".to_string(),
        "6090514".to_string(),
    ]));
}

#[test]
fn test_existing_tables_skip_import_and_postprocess() {
    let project = Project::new(config());
    let factory = BundleFactory::new(&project.env);
    let runner = RecordingRunner::probing(true);

    project
        .run(&factory, &runner, Phase::LoadData, Some("mapserverconfig"))
        .unwrap();

    let programs = runner.programs();
    assert!(!programs.iter().any(|p| p.ends_with("/osm2pgsql")));
    assert!(!programs.iter().any(|p| p == "psql"));
    assert_eq!(programs.len(), 1, "{:?}", programs);
    assert_eq!(runner.probes.borrow().len(), 4);
}

#[test]
fn test_failed_import_aborts_before_mapserver() {
    let project = Project::new(config());
    let factory = BundleFactory::new(&project.env);
    let runner = RecordingRunner {
        fail_program: Some("osm2pgsql".into()),
        ..RecordingRunner::probing(false)
    };

    let err = project
        .run(&factory, &runner, Phase::LoadData, Some("mapserverconfig"))
        .unwrap_err();
    assert!(err.to_string().contains("osmdata_osm_mapserver"));
    assert!(!runner.programs().iter().any(|p| p.ends_with("/shp2img")));
}

#[test]
fn test_database_setup_runs_as_postgres() {
    let project = Project::new(config());
    let factory = BundleFactory::new(&project.env);
    // no package installed yet, geometry_columns missing
    let runner = RecordingRunner::probing(false);

    project
        .run(&factory, &runner, Phase::SystemSetup, Some("setupdatabase"))
        .unwrap();

    assert_eq!(
        runner.programs(),
        vec!["aptitude", "aptitude", "createuser", "psql", "createdb", "psql", "psql"]
    );
    let runs = runner.runs.borrow();
    for cmd in &runs[2..] {
        assert_eq!(cmd.get_user(), Some("postgres"), "{}", cmd);
    }
    assert!(runs[1].get_args().contains(&"postgis".to_string()));
}

#[test]
fn test_core_build_renders_templates() {
    let project = Project::new(config());
    let conf = project.env.project_path("apache").join("apache.conf.in");
    std::fs::create_dir_all(conf.parent().unwrap()).unwrap();
    std::fs::write(&conf, "DocumentRoot @@DOCUMENT_ROOT@@\nServerName @@APACHE_SERVER_NAME@@\n").unwrap();

    let factory = BundleFactory::new(&project.env);
    let runner = RecordingRunner::default();
    project
        .run(&factory, &runner, Phase::Build, Some("apacheconfig"))
        .unwrap();

    let rendered = std::fs::read_to_string(project.env.project_path("apache/apache.conf")).unwrap();
    assert_eq!(
        rendered,
        format!(
            "DocumentRoot {}\nServerName carto\n",
            project.env.project_path("htdocs").display()
        )
    );
}

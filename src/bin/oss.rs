//! oss - provision an OpenStreetMap server stack
//!
//! Usage:
//!   oss <phase>                   Run a phase over every enabled bundle
//!   oss <unit>:<phase>            Run a phase for one unit and its dependencies
//!   oss --list [<unit>:]<phase>   Print the execution order and exit

use anyhow::{Context, Result};
use clap::Parser;
use osm_server_setup::bundles::BundleFactory;
use osm_server_setup::core::deps::names;
use osm_server_setup::core::phase::Command;
use osm_server_setup::helpers::cmd::SystemRunner;
use osm_server_setup::{Config, Executor, Fetcher, RunEnv, RunOptions, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "oss")]
#[command(about = "Provision an OpenStreetMap rendering stack")]
#[command(
    long_about = "Standard phases: create_project, system_setup, system_setup_clean, \
                  download, download_clean, build, load_data, load_data_clean, generate, \
                  generate_clean, read_replication, load_replication"
)]
#[command(version)]
struct Cli {
    /// Phase to run, optionally scoped to one unit as `unit:phase`
    command: Command,

    /// Overwrite existing files when copying the project template
    #[arg(long)]
    overwrite: bool,

    /// Print debug logging and stream command output
    #[arg(short, long)]
    verbose: bool,

    /// Project directory (default: parent of the setup directory)
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Directory holding template/ and patches/ (default: current directory)
    #[arg(long)]
    setup_dir: Option<PathBuf>,

    /// Do not ask for confirmation
    #[arg(long, env = "OSS_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Allow root to run every phase
    #[arg(long = "allow-root", env = "OSS_ALLOW_ROOT_ALL_COMMANDS")]
    allow_root_all: bool,

    /// Print the units the command would run, in order, and exit
    #[arg(long)]
    list: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false).without_time())
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let phase = cli.command.phase;
    let only = cli.command.unit.as_deref();

    let setup_dir = match cli.setup_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    let setup_dir = std::fs::canonicalize(&setup_dir)
        .with_context(|| format!("setup directory not found: {}", setup_dir.display()))?;
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => setup_dir
            .parent()
            .map(PathBuf::from)
            .context("setup directory has no parent")?,
    };

    let config = Config::load(&project_dir)?;
    tracing::debug!(?config, "configuration");
    let options = RunOptions::default()
        .overwrite(cli.overwrite)
        .verbose(cli.verbose)
        .non_interactive(cli.non_interactive)
        .allow_root_all(cli.allow_root_all);
    let env = RunEnv::new(project_dir, setup_dir, config).with_options(options);

    let factory = BundleFactory::new(&env);
    let runner = SystemRunner::new(cli.verbose);
    let executor = Executor::new(&env, &factory, &runner);

    if cli.list {
        let units = executor.plan(only)?;
        output::info(&format!("{} would run {} units:", phase, units.len()));
        for (i, name) in names(&units).iter().enumerate() {
            output::action_numbered(i + 1, units.len(), name);
        }
        return Ok(());
    }

    let mut fetcher = Fetcher::open(&env)?;
    let report = executor.run(phase, only, &mut fetcher)?;
    tracing::debug!(ran = ?report.ran, skipped = ?report.skipped, "run finished");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

//! PostGIS database setup and the `psql` access other bundles share.

use super::{SETUP_DATABASE, supports};
use crate::core::config::Config;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{PhaseContext, Unit};
use crate::helpers::cmd::{Cmd, CommandRunner};
use crate::helpers::packages::install_packages;
use anyhow::Result;
use std::path::Path;

/// Account owning the database cluster.
const POSTGRES_USER: &str = "postgres";

const PACKAGES: &[&str] = &["postgresql", "postgresql-contrib", "postgis"];

/// Connection settings for running `psql` as the project database user.
#[derive(Debug, Clone)]
pub struct Psql {
    host: String,
    port: String,
    dbname: String,
    user: String,
    password: String,
}

impl Psql {
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.db_host.clone(),
            port: config.db_port.clone(),
            dbname: config.db_name.clone(),
            user: config.db_user.clone(),
            password: config.db_password.clone(),
        }
    }

    /// libpq environment selecting the project database.
    pub fn env(&self) -> [(&'static str, &str); 5] {
        [
            ("PGHOST", self.host.as_str()),
            ("PGPORT", self.port.as_str()),
            ("PGDATABASE", self.dbname.as_str()),
            ("PGUSER", self.user.as_str()),
            ("PGPASSWORD", self.password.as_str()),
        ]
    }

    fn cmd(&self) -> Cmd {
        Cmd::new("psql").envs(self.env())
    }

    /// Whether `sql` runs without error.
    pub fn query_succeeds(&self, runner: &dyn CommandRunner, sql: &str) -> Result<bool> {
        runner.succeeds(&self.cmd().args(["-q", "-o/dev/null", "-c", sql]))
    }

    pub fn execute_sql(&self, runner: &dyn CommandRunner, sql: &str) -> Result<()> {
        runner.run(&self.cmd().args(["-c", sql]))
    }

    pub fn execute_sql_file(&self, runner: &dyn CommandRunner, file: &Path) -> Result<()> {
        runner.run(&self.cmd().stdin_file(file))
    }

    /// Pipe the stdout of a shell command into `psql`.
    pub fn execute_piped(&self, runner: &dyn CommandRunner, producer: &str, dir: &Path) -> Result<()> {
        runner.run(
            &Cmd::shell(format!("{} | psql -q", producer))
                .dir(dir)
                .envs(self.env()),
        )
    }

    /// Drop a PostGIS table if it exists.
    pub fn drop_geometry_table(&self, runner: &dyn CommandRunner, table: &str) -> Result<()> {
        self.execute_sql(runner, &format!("DROP TABLE IF EXISTS \"{}\" CASCADE", table))
    }
}

/// Creates the database user and the PostGIS-enabled database.
#[derive(Debug)]
pub struct SetupDatabase {
    psql: Psql,
    db_name: String,
    db_user: String,
    db_password: String,
}

impl SetupDatabase {
    const PHASES: &'static [Phase] = &[Phase::SystemSetup, Phase::SystemSetupClean];

    pub fn new(config: &Config) -> Self {
        Self {
            psql: Psql::new(config),
            db_name: config.db_name.clone(),
            db_user: config.db_user.clone(),
            db_password: config.db_password.clone(),
        }
    }

    pub fn psql(&self) -> &Psql {
        &self.psql
    }

    fn as_postgres(program: &str) -> Cmd {
        Cmd::new(program).user(POSTGRES_USER)
    }

    fn system_setup(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        install_packages(cx.runner, PACKAGES)?;

        if self
            .psql
            .query_succeeds(cx.runner, "select * from geometry_columns")?
        {
            output::skip("database already set up");
            return Ok(());
        }

        let runner = cx.runner;
        let created = runner
            .run(&Self::as_postgres("createuser").args(["-SDR", self.db_user.as_str()]))
            .and_then(|_| {
                runner.run(&Self::as_postgres("psql").arg("-c").arg(format!(
                    "ALTER USER {} WITH PASSWORD '{}'",
                    self.db_user,
                    self.db_password.replace('\'', "''")
                )))
            });
        if let Err(e) = created {
            output::warning(&format!("failed to create user, it may already exist ({})", e));
        }

        runner.run(&Self::as_postgres("createdb").args([
            "-E",
            "UTF8",
            "-O",
            self.db_user.as_str(),
            self.db_name.as_str(),
        ]))?;
        runner.run(&Self::as_postgres("psql").args([
            "-d",
            self.db_name.as_str(),
            "-c",
            "CREATE EXTENSION IF NOT EXISTS postgis",
        ]))?;
        runner.run(
            &Self::as_postgres("psql")
                .args(["-d", self.db_name.as_str(), "-c"])
                .arg(format!("ALTER TABLE spatial_ref_sys OWNER TO {}", self.db_user)),
        )
    }

    fn system_setup_clean(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        if !cx.env.options.non_interactive {
            let question = format!(
                "This will delete the database {} and user {}. Are you sure?",
                self.db_name, self.db_user
            );
            if !output::confirm(&question)? {
                return Ok(());
            }
        }

        if let Err(e) = cx
            .runner
            .run(&Self::as_postgres("dropdb").arg(self.db_name.as_str()))
        {
            tracing::debug!(error = %e, "dropdb failed");
        }
        cx.runner
            .run(&Self::as_postgres("dropuser").arg(self.db_user.as_str()))
    }
}

impl Unit for SetupDatabase {
    fn name(&self) -> &str {
        SETUP_DATABASE
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::SystemSetup => self.system_setup(cx),
            Phase::SystemSetupClean => self.system_setup_clean(cx),
            _ => Ok(()),
        }
    }
}

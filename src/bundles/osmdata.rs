//! OSM extracts imported into PostGIS under a table prefix.

use super::database::SetupDatabase;
use super::osm2pgsql::Osm2pgsqlBuild;
use super::osmosis::Osmosis;
use super::{OSM_DATA, OSM2PGSQL_BUILD, OSMOSIS, SETUP_DATABASE, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{DependencySpec, PhaseContext, Unit};
use crate::fetch::Resource;
use crate::helpers::cmd::Cmd;
use anyhow::Result;

/// Tables osm2pgsql creates for each prefix.
pub const OSM_TABLES: [&str; 4] = ["point", "line", "polygon", "roads"];

#[derive(Debug)]
pub struct OsmData {
    name: String,
    tables_prefix: String,
    env: RunEnv,
    resources: Vec<Resource>,
    did_load_data: bool,
}

impl OsmData {
    const PHASES: &'static [Phase] = &[
        Phase::Download,
        Phase::DownloadClean,
        Phase::LoadData,
        Phase::LoadDataClean,
        Phase::LoadReplication,
    ];

    pub fn new(env: &RunEnv, tables_prefix: &str) -> Self {
        Self {
            name: DependencySpec::instance(OSM_DATA, tables_prefix).unit_name(),
            tables_prefix: tables_prefix.to_string(),
            env: env.clone(),
            resources: env
                .config
                .osm_data_urls
                .iter()
                .map(|url| Resource::new(url.as_str()))
                .collect(),
            did_load_data: false,
        }
    }

    /// Whether `load_data` imported anything during this run.
    pub fn did_load_data(&self) -> bool {
        self.did_load_data
    }

    fn table(&self, suffix: &str) -> String {
        format!("{}_{}", self.tables_prefix, suffix)
    }

    fn osm2pgsql(&self, cx: &PhaseContext<'_>, extra: Vec<String>) -> Result<()> {
        let build = cx.unit::<Osm2pgsqlBuild>(OSM2PGSQL_BUILD)?;
        let c = &self.env.config;
        let style = c
            .osm_data_style_path
            .get(&self.tables_prefix)
            .cloned()
            .unwrap_or_else(|| build.default_style().display().to_string());
        let bbox: Vec<String> = c.extent.iter().map(f64::to_string).collect();

        let mut cmd = Cmd::new(build.binary().to_string_lossy())
            .args(["-H", c.db_host.as_str()])
            .args(["-P", c.db_port.as_str()])
            .args(["-U", c.db_user.as_str()])
            .args(["-d", c.db_name.as_str()])
            .args(["-p", self.tables_prefix.as_str()])
            .arg("--bbox")
            .arg(bbox.join(","))
            .arg("-S")
            .arg(style)
            .env("PGPASSWORD", c.db_password.as_str());
        if c.osm2pgsql_slim_mode {
            cmd = cmd.arg("--slim");
        }
        let cmd = cmd.args(extra);

        tracing::info!(command = %cmd, "running osm2pgsql");
        cx.runner.run(&cmd)
    }

    fn load_data(&mut self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let psql = cx.unit::<SetupDatabase>(SETUP_DATABASE)?.psql();

        let mut loaded = true;
        for table in OSM_TABLES {
            let sql = format!("select * from \"{}\" limit 1", self.table(table));
            if !psql.query_succeeds(cx.runner, &sql)? {
                loaded = false;
                break;
            }
        }
        if loaded {
            output::skip(&format!("{} tables already loaded", self.tables_prefix));
            return Ok(());
        }

        let files = self
            .resources
            .iter()
            .map(|r| cx.fetcher.locate(r).display().to_string())
            .collect();
        self.osm2pgsql(cx, files)?;
        self.did_load_data = true;
        Ok(())
    }

    fn load_data_clean(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let psql = cx.unit::<SetupDatabase>(SETUP_DATABASE)?.psql();
        for table in OSM_TABLES {
            psql.drop_geometry_table(cx.runner, &self.table(table))?;
        }
        Ok(())
    }

    fn load_replication(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let osmosis = cx.unit::<Osmosis>(OSMOSIS)?;
        let args = vec![
            "--append".to_string(),
            osmosis.changes_file().display().to_string(),
        ];
        self.osm2pgsql(cx, args)
    }
}

impl Unit for OsmData {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<DependencySpec> {
        let mut deps = vec![
            DependencySpec::of(SETUP_DATABASE),
            DependencySpec::of(OSM2PGSQL_BUILD),
        ];
        if self.env.config.use_osmosis {
            deps.push(DependencySpec::of(OSMOSIS));
        }
        deps
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::Download => cx.fetch_all(&self.resources),
            Phase::DownloadClean => cx.clean_all(&self.resources),
            Phase::LoadData => self.load_data(cx),
            Phase::LoadDataClean => self.load_data_clean(cx),
            Phase::LoadReplication => self.load_replication(cx),
            _ => Ok(()),
        }
    }
}

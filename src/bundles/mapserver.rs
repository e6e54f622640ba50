//! MapServer: the CGI binary built from a release tarball, and the
//! mapserver-utils mapfile generator configured for the `osm_mapserver`
//! tables.

use super::database::SetupDatabase;
use super::osmdata::OsmData;
use super::{
    MAPSERVER_BUILD, MAPSERVER_CONFIG, OSM_DATA, SETUP_DATABASE, extent_osm, make_jobs, supports,
};
use crate::core::config::Config;
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{DependencySpec, PhaseContext, Unit};
use crate::fetch::Resource;
use crate::helpers::cmd::{Cmd, CommandRunner};
use crate::helpers::fs::{copy_file, make_dirs_as_project_owner, maybe_unlink};
use crate::helpers::packages::{apply_patches, install_packages};
use crate::helpers::svn::SvnCheckout;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const VERSION: &str = "6.0.0";
const ARCHIVE_MD5: &str = "5bcb1a6fb4a743e9f069466fbdf4ab76";

/// Configure flags, as used by the Debian package.
const CONFIGURE_FLAGS: &[&str] = &[
    "--enable-debug",
    "--without-tiff",
    "--without-pdf",
    "--with-gd=/usr",
    "--with-freetype=/usr",
    "--with-fribidi-config",
    "--with-ming",
    "--with-zlib=/usr",
    "--with-png=/usr",
    "--with-xpm=/usr",
    "--with-jpeg=/usr",
    "--with-gdal",
    "--with-ogr",
    "--with-proj",
    "--with-eppl",
    "--with-postgis",
    "--with-wcs",
    "--with-sos",
    "--with-wms",
    "--with-wmsclient",
    "--with-wfs",
    "--with-wfsclient",
    "--with-threads",
    "--with-geos",
    "--with-fastcgi",
    "--with-agg",
    "--with-experimental-png",
];

/// Build dependencies of the Debian mapserver source package, from the
/// `Inst` lines of a simulated `apt-get build-dep`.
fn parse_build_deps(simulation: &str) -> Vec<String> {
    simulation
        .lines()
        .filter(|line| line.starts_with("Inst"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub struct MapserverBuild {
    project_dir: PathBuf,
    ms_dir: PathBuf,
}

impl MapserverBuild {
    const PHASES: &'static [Phase] = &[Phase::SystemSetup, Phase::Download, Phase::Build];

    pub fn new(env: &RunEnv) -> Self {
        Self {
            project_dir: env.project_dir.clone(),
            ms_dir: env.build_dir().join(format!("mapserver-{}", VERSION)),
        }
    }

    /// Unpacked source tree, which is also where the binaries are built.
    pub fn ms_dir(&self) -> &Path {
        &self.ms_dir
    }

    fn resources() -> Vec<Resource> {
        vec![
            Resource::new(format!(
                "http://download.osgeo.org/mapserver/mapserver-{}.tar.gz",
                VERSION
            ))
            .extract_to("build")
            .checksum(ARCHIVE_MD5),
        ]
    }

    fn system_setup(&self, runner: &dyn CommandRunner) -> Result<()> {
        let simulation = runner.output(&Cmd::shell("apt-get -s build-dep mapserver"))?;
        let packages = parse_build_deps(&simulation);
        let packages: Vec<&str> = packages.iter().map(String::as_str).collect();
        install_packages(runner, &packages)
    }

    fn build(&self, runner: &dyn CommandRunner) -> Result<()> {
        let mapserv = self.ms_dir.join("mapserv");
        if mapserv.is_file() {
            output::skip("mapserv already built");
            return Ok(());
        }

        runner.run(&Cmd::new("./configure").args(CONFIGURE_FLAGS.iter().copied()).dir(&self.ms_dir))?;
        runner.run(&Cmd::new("make").arg("-j").arg(make_jobs()).dir(&self.ms_dir))?;

        let cgi_dir = self.project_dir.join("apache").join("cgi-bin");
        make_dirs_as_project_owner(&self.project_dir, &cgi_dir)?;
        copy_file(&mapserv, &cgi_dir.join("mapserv"), true)?;
        Ok(())
    }
}

impl Unit for MapserverBuild {
    fn name(&self) -> &str {
        MAPSERVER_BUILD
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::SystemSetup => self.system_setup(cx.runner),
            Phase::Download => cx.fetch_all(&Self::resources()),
            Phase::Build => self.build(cx.runner),
            _ => Ok(()),
        }
    }
}

/// Table prefix the generated mapfile reads from.
pub const TABLES_PREFIX: &str = "osm_mapserver";

/// Archives mapserver-utils would otherwise download itself.
const DATA_ARCHIVES: [&str; 7] = [
    "processed_p.tar.bz2",
    "world_boundaries-spherical.tgz",
    "10m-populated-places.zip",
    "10m-admin-0-boundary-lines-land.zip",
    "110m-admin-0-boundary-lines.zip",
    "shoreline_300.tar.bz2",
    "TM_WORLD_BORDERS-0.3.zip",
];

/// `dbconnection` include for the mapfile preprocessor.
fn dbconnection(c: &Config) -> String {
    format!(
        "#define _db_connection \"host={} dbname={} user={} password={} port={}\"\n",
        c.db_host, c.db_name, c.db_user, c.db_password, c.db_port
    )
}

/// Rewrite the `KEY=value` lines of the mapserver-utils Makefile we own.
fn rewrite_makefile(content: &str, srid: u32) -> String {
    let srid = srid.to_string();
    let params = [("OSM_PREFIX", "osm_mapserver_"), ("OSM_SRID", srid.as_str())];

    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let replacement = line
            .split_once('=')
            .filter(|(_, value)| !value.contains('='))
            .and_then(|(key, _)| params.iter().find(|(k, _)| *k == key));
        match replacement {
            Some((key, value)) => out.push_str(&format!("{}={}", key, value)),
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

#[derive(Debug)]
pub struct MapserverConfig {
    env: RunEnv,
    checkout: SvnCheckout,
}

impl MapserverConfig {
    const PHASES: &'static [Phase] = &[
        Phase::CreateProject,
        Phase::SystemSetup,
        Phase::Download,
        Phase::Build,
        Phase::LoadData,
    ];

    pub fn new(env: &RunEnv) -> Self {
        let c = &env.config;
        Self {
            env: env.clone(),
            checkout: SvnCheckout::new(
                c.mapserver_svn_url.as_str(),
                c.mapserver_svn_revision.as_str(),
                env.project_path("mapserver-utils"),
            )
            .export(),
        }
    }

    fn utils_dir(&self) -> &Path {
        &self.checkout.dir
    }

    fn resources() -> Vec<Resource> {
        vec![
            Resource::new("http://thematicmapping.org/downloads/TM_WORLD_BORDERS-0.3.zip")
                .checksum("7ac5c67b43e1dc9233cdb48bdf018a6c"),
            Resource::new(
                "http://www.naturalearthdata.com/http//www.naturalearthdata.com/download/10m/cultural/10m-admin-0-boundary-lines-land.zip",
            )
            .checksum("f3dc23b8d3ede755d56b50f2ca7d0612"),
        ]
    }

    fn write_settings(&self) -> Result<()> {
        let dir = self.utils_dir();
        let dbconn = dir.join("dbconnection");
        std::fs::write(&dbconn, dbconnection(&self.env.config))
            .with_context(|| format!("cannot write {}", dbconn.display()))?;

        let makefile = dir.join("Makefile");
        let content = std::fs::read_to_string(&makefile)
            .with_context(|| format!("cannot read {}", makefile.display()))?;
        std::fs::write(&makefile, rewrite_makefile(&content, self.env.config.srid_osm))
            .with_context(|| format!("cannot write {}", makefile.display()))
    }

    fn create_project(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        self.checkout.fetch(cx.runner)?;

        let data_makefile = self.utils_dir().join("data").join("Makefile");
        let content = std::fs::read_to_string(&data_makefile)
            .with_context(|| format!("cannot read {}", data_makefile.display()))?;
        // patched files already unzip with -o
        if !content.contains("unzip -o") {
            apply_patches(cx.runner, &cx.env.patches_dir("mapserver-utils"), self.utils_dir())?;
        }
        self.write_settings()
    }

    fn download(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        cx.fetch_all(&Self::resources())?;

        let data_dir = self.utils_dir().join("data");
        for archive in DATA_ARCHIVES {
            let cached = cx.fetcher.cache_dir().join(archive);
            let link = data_dir.join(archive);
            if !cached.is_file() || link.is_file() {
                continue;
            }
            tracing::debug!(from = %cached.display(), to = %link.display(), "linking cached archive");
            std::fs::hard_link(&cached, &link)
                .with_context(|| format!("cannot link {} to {}", cached.display(), link.display()))?;
        }

        let project = &self.env.project_dir;
        if let Err(e) = cx.runner.run(
            &Cmd::shell("cp -rl data/world_boundaries/* mapserver-utils/data/").dir(project),
        ) {
            tracing::debug!(error = %e, "no world boundaries to link");
        }
        cx.runner
            .run(&Cmd::shell("touch mapserver-utils/data/*shp").dir(project))?;
        cx.runner.run(&Cmd::new("make").dir(&data_dir))
    }

    fn build(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        self.write_settings()?;
        maybe_unlink(&self.utils_dir().join("postprocess.sql"))?;
        cx.runner.run(&Cmd::new("make").dir(self.utils_dir()))
    }

    fn load_data(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let osm_data = DependencySpec::instance(OSM_DATA, TABLES_PREFIX).unit_name();
        if cx.unit::<OsmData>(&osm_data)?.did_load_data() {
            output::sub_action("executing postprocess.sql");
            cx.unit::<SetupDatabase>(SETUP_DATABASE)?
                .psql()
                .execute_sql_file(cx.runner, &self.utils_dir().join("postprocess.sql"))?;
        }

        // render one image to catch mapfile errors early
        let build = cx.unit::<MapserverBuild>(MAPSERVER_BUILD)?;
        let extent = extent_osm(cx.env, cx.runner)?;
        cx.runner.run(
            &Cmd::new(build.ms_dir().join("shp2img").to_string_lossy())
                .args(["-m", "osm-mapserver.map", "-o", "osm.png", "-e"])
                .args(extent.iter().map(|c| (c.trunc() as i64).to_string()))
                .dir(self.utils_dir()),
        )
    }
}

impl Unit for MapserverConfig {
    fn name(&self) -> &str {
        MAPSERVER_CONFIG
    }

    fn dependencies(&self) -> Vec<DependencySpec> {
        vec![
            DependencySpec::instance(OSM_DATA, TABLES_PREFIX),
            DependencySpec::of(MAPSERVER_BUILD),
        ]
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::CreateProject => self.create_project(cx),
            Phase::SystemSetup => install_packages(cx.runner, &["cpp", "make", "patch"]),
            Phase::Download => self.download(cx),
            Phase::Build => self.build(cx),
            Phase::LoadData => self.load_data(cx),
            _ => Ok(()),
        }
    }
}

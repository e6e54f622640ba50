//! Mapnik stylesheets (one export per instance) and the OGC server.

use super::{MAPNIK_CONFIG, MAPNIK_OGCSERVER, OSM_DATA, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{DependencySpec, PhaseContext, Unit};
use crate::fetch::Resource;
use crate::helpers::cmd::Cmd;
use crate::helpers::fs::make_dirs_as_project_owner;
use crate::helpers::packages::{apply_patches, install_packages};
use crate::helpers::svn::SvnCheckout;
use anyhow::Result;
use std::path::PathBuf;

/// Table prefix Mapnik stylesheets read from.
pub const TABLES_PREFIX: &str = "osm_mapnik";

const OGCSERVER_REPO: &str = "https://github.com/mapnik/OGCServer.git";

/// Shared background layers. The mapserver bundle links the same archives
/// out of the download cache.
pub fn world_boundaries() -> Vec<Resource> {
    vec![
        Resource::new("http://tile.openstreetmap.org/world_boundaries-spherical.tgz")
            .extract_to("data")
            .checksum("4feb2f60a37bbe4e8a33596befcd0a1c"),
        Resource::new("http://tile.openstreetmap.org/processed_p.tar.bz2")
            .extract_to("data/world_boundaries"),
        Resource::new("http://tile.openstreetmap.org/shoreline_300.tar.bz2")
            .extract_to("data/world_boundaries"),
        Resource::new(
            "http://www.naturalearthdata.com/http//www.naturalearthdata.com/download/10m/cultural/10m-populated-places.zip",
        )
        .extract_to("data/world_boundaries")
        .checksum("c7dc8df2ab4a325f5c4fde3e1727655e"),
        Resource::new(
            "http://www.naturalearthdata.com/http//www.naturalearthdata.com/download/110m/cultural/110m-admin-0-boundary-lines.zip",
        )
        .extract_to("data/world_boundaries")
        .checksum("1d116cde1491e514f3f49224682f82b5"),
    ]
}

/// A Mapnik stylesheet instance rendering the `osm_mapnik` tables.
#[derive(Debug)]
pub struct MapnikConfig {
    name: String,
    instance: String,
    env: RunEnv,
    checkout: SvnCheckout,
}

impl MapnikConfig {
    const PHASES: &'static [Phase] = &[
        Phase::CreateProject,
        Phase::SystemSetup,
        Phase::Download,
        Phase::Build,
        Phase::Generate,
    ];

    pub fn new(env: &RunEnv, instance: &str) -> Self {
        let c = &env.config;
        Self {
            name: DependencySpec::instance(MAPNIK_CONFIG, instance).unit_name(),
            instance: instance.to_string(),
            env: env.clone(),
            checkout: SvnCheckout::new(
                c.mapnik_svn_url.as_str(),
                c.mapnik_svn_revision.as_str(),
                env.project_path(format!("mapnik_{}", instance)),
            )
            .export(),
        }
    }

    /// Directory the tiles of this instance are written to.
    pub fn tiles_dir(&self) -> PathBuf {
        self.env
            .data_dir()
            .join("tiles")
            .join(format!("mapnik_{}", self.instance))
    }

    fn build(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let c = &self.env.config;
        let cmd = Cmd::new("python")
            .arg("generate_xml.py")
            .args(["--host", c.db_host.as_str()])
            .args(["--port", c.db_port.as_str()])
            .args(["--user", c.db_user.as_str()])
            .args(["--dbname", c.db_name.as_str()])
            .args(["--password", c.db_password.as_str()])
            .arg("--world_boundaries")
            .arg(self.env.data_dir().join("world_boundaries").to_string_lossy())
            .args(["--prefix", TABLES_PREFIX])
            .dir(&self.checkout.dir);
        cx.runner.run(&cmd)
    }

    fn generate(&self) -> Result<()> {
        let tiles = self.tiles_dir();
        make_dirs_as_project_owner(&self.env.project_dir, &tiles)?;
        output::detail(&format!("tiles for {} go to {}", self.name, tiles.display()));
        Ok(())
    }
}

impl Unit for MapnikConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<DependencySpec> {
        vec![DependencySpec::instance(OSM_DATA, TABLES_PREFIX)]
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::CreateProject => self.checkout.fetch(cx.runner),
            Phase::SystemSetup => install_packages(cx.runner, &["python-mapnik"]),
            Phase::Download => cx.fetch_all(&world_boundaries()),
            Phase::Build => self.build(cx),
            Phase::Generate => self.generate(),
            _ => Ok(()),
        }
    }
}

/// The Mapnik OGC (WMS) server, cloned and patched into `build/`.
#[derive(Debug)]
pub struct MapnikOgcServer;

impl MapnikOgcServer {
    fn download(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let build_dir = cx.env.build_dir();
        let dir = build_dir.join("OGCServer");
        if dir.is_dir() {
            output::skip("OGCServer already cloned");
            return Ok(());
        }
        make_dirs_as_project_owner(&cx.env.project_dir, &build_dir)?;
        cx.runner
            .run(&Cmd::new("git").args(["clone", OGCSERVER_REPO]).dir(&build_dir))?;
        apply_patches(cx.runner, &cx.env.patches_dir("mapnik_ogcserver"), &dir)
    }
}

impl Unit for MapnikOgcServer {
    fn name(&self) -> &str {
        MAPNIK_OGCSERVER
    }

    fn supports(&self, phase: Phase) -> bool {
        phase == Phase::Download
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::Download => self.download(cx),
            _ => Ok(()),
        }
    }
}

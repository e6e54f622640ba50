//! Concrete provisioning units
//!
//! Each bundle is keyed by a kind string. [`BundleFactory`] turns a
//! [`DependencySpec`] into the matching unit and lists the roots the
//! configuration enables, in the order they should run.

pub mod database;
pub mod mapnik;
pub mod mapserver;
pub mod osm2pgsql;
pub mod osmdata;
pub mod osmosis;
pub mod project;
pub mod srtm;
pub mod tilecache;
pub mod web;

use crate::core::context::RunEnv;
use crate::core::error::Error;
use crate::core::phase::Phase;
use crate::core::unit::{CORE_KIND, DependencySpec, Unit, UnitFactory};
use crate::helpers::cmd::CommandRunner;
use crate::helpers::coords::{SRID_LATLON, convert_bbox};
use anyhow::{Result, bail};

pub const SETUP_DATABASE: &str = "setupdatabase";
pub const OSM2PGSQL_BUILD: &str = "osm2pgsqlbuild";
pub const OSMOSIS: &str = "osmosis";
pub const OSM_DATA: &str = "osmdata";
pub const SRTM_DATA: &str = "srtmdata";
pub const MAPNIK_CONFIG: &str = "mapnikconfig";
pub const MAPNIK_OGCSERVER: &str = "mapnikogcserver";
pub const MAPSERVER_BUILD: &str = "mapserverbuild";
pub const MAPSERVER_CONFIG: &str = "mapserverconfig";
pub const TILECACHE: &str = "tilecache";
pub const APACHE_CONFIG: &str = "apacheconfig";
pub const OPENLAYERS: &str = "openlayers";

/// Every kind the factory can build.
pub const KINDS: [&str; 13] = [
    CORE_KIND,
    SETUP_DATABASE,
    OSM2PGSQL_BUILD,
    OSMOSIS,
    OSM_DATA,
    SRTM_DATA,
    MAPNIK_CONFIG,
    MAPNIK_OGCSERVER,
    MAPSERVER_BUILD,
    MAPSERVER_CONFIG,
    TILECACHE,
    APACHE_CONFIG,
    OPENLAYERS,
];

/// Builds bundles for one run environment.
#[derive(Debug, Clone)]
pub struct BundleFactory {
    env: RunEnv,
}

impl BundleFactory {
    pub fn new(env: &RunEnv) -> Self {
        Self { env: env.clone() }
    }
}

fn no_instance(spec: &DependencySpec) -> Result<()> {
    if let Some(instance) = &spec.instance {
        bail!("{} does not take an instance (got {})", spec.kind, instance);
    }
    Ok(())
}

fn instance(spec: &DependencySpec) -> Result<&str> {
    match spec.instance.as_deref() {
        Some(instance) if !instance.is_empty() => Ok(instance),
        _ => bail!("{} needs an instance name", spec.kind),
    }
}

impl UnitFactory for BundleFactory {
    fn create(&self, spec: &DependencySpec) -> Result<Box<dyn Unit>> {
        let env = &self.env;
        let kind = spec.kind.as_str();
        if kind != OSM_DATA && kind != MAPNIK_CONFIG {
            no_instance(spec)?;
        }

        let unit: Box<dyn Unit> = match kind {
            CORE_KIND => Box::new(project::CoreBundle::new()),
            SETUP_DATABASE => Box::new(database::SetupDatabase::new(&env.config)),
            OSM2PGSQL_BUILD => Box::new(osm2pgsql::Osm2pgsqlBuild::new(env)),
            OSMOSIS => Box::new(osmosis::Osmosis::new(env)),
            OSM_DATA => Box::new(osmdata::OsmData::new(env, instance(spec)?)),
            SRTM_DATA => Box::new(srtm::SrtmData::new(env)),
            MAPNIK_CONFIG => Box::new(mapnik::MapnikConfig::new(env, instance(spec)?)),
            MAPNIK_OGCSERVER => Box::new(mapnik::MapnikOgcServer),
            MAPSERVER_BUILD => Box::new(mapserver::MapserverBuild::new(env)),
            MAPSERVER_CONFIG => Box::new(mapserver::MapserverConfig::new(env)),
            TILECACHE => Box::new(tilecache::TileCache::new(env)),
            APACHE_CONFIG => Box::new(web::ApacheConfig),
            OPENLAYERS => Box::new(web::OpenLayers),
            _ => {
                return Err(Error::UnknownKind {
                    kind: spec.kind.clone(),
                }
                .into());
            }
        };
        Ok(unit)
    }

    fn requested(&self) -> Vec<DependencySpec> {
        let c = &self.env.config;
        let mut roots = Vec::new();
        if c.use_srtm {
            roots.push(DependencySpec::of(SRTM_DATA));
        }
        for name in &c.mapnik_instances {
            roots.push(DependencySpec::instance(MAPNIK_CONFIG, name.as_str()));
        }
        if c.use_mapnik_ogcserver {
            roots.push(DependencySpec::of(MAPNIK_OGCSERVER));
        }
        if c.use_mapserver {
            roots.push(DependencySpec::of(MAPSERVER_CONFIG));
        }
        if c.use_tilecache {
            roots.push(DependencySpec::of(TILECACHE));
        }
        if c.use_apache {
            roots.push(DependencySpec::of(APACHE_CONFIG));
        }
        if c.use_openlayers {
            roots.push(DependencySpec::of(OPENLAYERS));
        }
        roots
    }
}

/// Phase membership test for a bundle's fixed phase list.
pub(crate) fn supports(phases: &[Phase], phase: Phase) -> bool {
    phases.contains(&phase)
}

/// The configured extent in the OSM data projection. Uses `extent_osm` from
/// the configuration when set, otherwise asks cs2cs.
pub fn extent_osm(env: &RunEnv, runner: &dyn CommandRunner) -> Result<[f64; 4]> {
    match env.config.extent_osm {
        Some(extent) => Ok(extent),
        None => convert_bbox(runner, SRID_LATLON, env.config.srid_osm, env.config.extent),
    }
}

/// Parallelism for `make -j`.
pub(crate) fn make_jobs() -> String {
    num_cpus::get().to_string()
}

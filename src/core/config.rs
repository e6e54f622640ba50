//! Project configuration
//!
//! Built-in defaults are overlaid by `config.toml` and then
//! `config_local.toml` from the project directory. Nested tables merge key
//! by key; scalars and arrays replace the lower layer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Config files read from the project directory, lowest precedence first.
pub const CONFIG_FILES: [&str; 2] = ["config.toml", "config_local.toml"];

/// A replacement elevation tile to use instead of the public SRTM one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HgtUrl {
    pub url: String,
    /// NASA naming convention, e.g. `N46E006.hgt.zip`.
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub db_host: String,
    pub db_port: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,

    /// Area of interest in lon/lat: `[minx, miny, maxx, maxy]`.
    pub extent: [f64; 4],
    /// SRID used to store OSM data. Only spherical mercator is tested.
    pub srid_osm: u32,
    /// `extent` in `srid_osm` coordinates; computed with cs2cs when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent_osm: Option<[f64; 4]>,

    pub osm2pgsql_svn_url: String,
    pub osm2pgsql_svn_revision: String,
    pub osm2pgsql_slim_mode: bool,

    pub osm_data_urls: Vec<String>,
    /// Table prefix -> osm2pgsql style file.
    pub osm_data_style_path: BTreeMap<String, String>,
    pub use_osmosis: bool,

    pub use_srtm: bool,
    pub srtm_hgt_urls: Vec<HgtUrl>,
    /// URL template for elevation tiles; `{tile}` expands to e.g. `N46E006`.
    pub srtm_tile_url: String,
    pub srtm_resize_dimension: u32,
    pub use_hillshading: bool,

    /// Empty disables Mapnik.
    pub mapnik_instances: Vec<String>,
    pub mapnik_svn_url: String,
    pub mapnik_svn_revision: String,
    pub use_mapnik_ogcserver: bool,

    pub use_mapserver: bool,
    pub mapserver_svn_url: String,
    pub mapserver_svn_revision: String,

    pub use_tilecache: bool,
    pub tilecache_noseed_layers: Vec<String>,
    /// Zoom levels to seed, inclusive.
    pub seed_zoom_from: u32,
    pub seed_zoom_to: u32,

    pub use_apache: bool,
    pub apache_server_name: String,
    pub apache_server_aliases: Vec<String>,

    pub use_openlayers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_host: "localhost".into(),
            db_port: "5432".into(),
            db_name: "gis".into(),
            db_user: "gisuser".into(),
            db_password: "override-me".into(),
            extent: [5.94, 45.70, 10.54, 47.90],
            srid_osm: 900913,
            extent_osm: None,
            osm2pgsql_svn_url:
                "http://svn.openstreetmap.org/applications/utils/export/osm2pgsql/".into(),
            osm2pgsql_svn_revision: "26061".into(),
            osm2pgsql_slim_mode: false,
            osm_data_urls: vec![
                "http://download.geofabrik.de/osm/europe/switzerland.osm.bz2".into(),
            ],
            osm_data_style_path: BTreeMap::new(),
            use_osmosis: false,
            use_srtm: true,
            srtm_hgt_urls: Vec::new(),
            srtm_tile_url: "https://dds.cr.usgs.gov/srtm/version2_1/SRTM3/Eurasia/{tile}.hgt.zip"
                .into(),
            srtm_resize_dimension: 0,
            use_hillshading: true,
            mapnik_instances: vec!["upstream".into(), "custom".into()],
            mapnik_svn_url: "http://svn.openstreetmap.org/applications/rendering/mapnik".into(),
            mapnik_svn_revision: "26022".into(),
            use_mapnik_ogcserver: true,
            use_mapserver: true,
            mapserver_svn_url: "http://mapserver-utils.googlecode.com/svn/trunk/".into(),
            mapserver_svn_revision: "79".into(),
            use_tilecache: true,
            tilecache_noseed_layers: Vec::new(),
            seed_zoom_from: 1,
            seed_zoom_to: 10,
            use_apache: true,
            apache_server_name: "carto".into(),
            apache_server_aliases: Vec::new(),
            use_openlayers: true,
        }
    }
}

impl Config {
    /// Load the layered configuration for a project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut merged = to_table(&Config::default())?;

        for name in CONFIG_FILES {
            let path = project_dir.join(name);
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let layer: toml::Table = content
                .parse()
                .with_context(|| format!("failed to parse {}", path.display()))?;
            tracing::debug!(path = %path.display(), "applying config layer");
            merge_tables(&mut merged, layer);
        }

        toml::Value::Table(merged)
            .try_into()
            .context("invalid configuration")
    }

    /// Flat `KEY -> value` view used for `@@KEY@@` template substitution.
    pub fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let Ok(table) = to_table(self) else {
            return vars;
        };
        for (key, value) in table {
            let rendered = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => if b { "1" } else { "0" }.to_string(),
                other => other.to_string(),
            };
            vars.insert(key.to_uppercase(), rendered);
        }
        vars
    }
}

fn to_table(config: &Config) -> Result<toml::Table> {
    match toml::Value::try_from(config).context("failed to serialize config")? {
        toml::Value::Table(table) => Ok(table),
        other => anyhow::bail!("config serialized to {} instead of a table", other.type_str()),
    }
}

/// Overlay `layer` onto `base`. Tables recurse, everything else replaces.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        let src = match value {
            toml::Value::Table(src) => src,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        if let Some(toml::Value::Table(dst)) = base.get_mut(&key) {
            merge_tables(dst, src);
            continue;
        }
        base.insert(key, toml::Value::Table(src));
    }
}

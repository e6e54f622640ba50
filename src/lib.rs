//! Provisioning for a self-hosted OpenStreetMap server stack
//!
//! The stack (PostGIS database, osm2pgsql import, Mapnik and Mapserver
//! renderers, TileCache, Apache, OpenLayers) is described as a graph of
//! *bundles*. Each bundle is a [`Unit`] with a stable name, a list of
//! dependencies and a set of optional lifecycle phases.
//!
//! A run picks one [`Phase`] and optionally narrows it to a single unit:
//!
//! ```text
//! oss download                  # every enabled bundle, dependency-first
//! oss osmdata_osm_mapnik:load_data
//! ```
//!
//! # Lifecycle phases
//!
//! - `create_project` - copy the project template, check out configs
//! - `system_setup` / `system_setup_clean` - Debian packages, database (root only)
//! - `download` / `download_clean` - fetch artifacts into the download cache
//! - `build` - compile tools, render configuration
//! - `load_data` / `load_data_clean` - import OSM and elevation data
//! - `generate` / `generate_clean` - seed and purge the tile cache
//!
//! Every phase is written to be re-runnable: work that is already done
//! (files present, tables loaded, archives extracted) is detected and
//! skipped.
//!
//! # Download cache
//!
//! [`Fetcher`] keeps downloaded artifacts under `data/download_cache`,
//! keyed by source URL, and records download, checksum and extraction
//! state in `meta.json` so repeated runs do no redundant work.

pub mod bundles;
pub mod core;
pub mod fetch;
pub mod helpers;

pub use crate::core::config::Config;
pub use crate::core::context::{RunEnv, RunOptions};
pub use crate::core::deps::Resolver;
pub use crate::core::error::Error;
pub use crate::core::executor::Executor;
pub use crate::core::output;
pub use crate::core::phase::Phase;
pub use crate::core::unit::{DependencySpec, PhaseContext, Unit, UnitFactory};
pub use crate::fetch::{Fetcher, Resource};

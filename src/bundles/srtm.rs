//! SRTM elevation data: contour lines in PostGIS and an optional hillshading
//! raster.
//!
//! Tiles are one degree square and named after their south west corner
//! (`N46E006`). Every tile touching the configured extent is fetched through
//! the download cache unless a replacement with the same name was
//! configured in `srtm_hgt_urls`.

use super::database::SetupDatabase;
use super::{SETUP_DATABASE, SRTM_DATA, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{DependencySpec, PhaseContext, Unit};
use crate::fetch::Resource;
use crate::fetch::extract::extract;
use crate::helpers::cmd::Cmd;
use crate::helpers::fs::{copy_file, make_dirs_as_project_owner, maybe_unlink};
use crate::helpers::packages::{apply_patches, install_packages};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const CONTOURS_TABLE: &str = "contours";
const CONTOURS_INTERVAL: u32 = 10;
/// SRTM void marker. A wrong value blows up the contour shapefile.
const NO_DATA_VALUE: i32 = -32768;
const GEOCOLUMN: &str = "way";

const MERGED: &str = "contours.hgt";
const HILLSHADING: &str = "contours_hillshading.tif";

const PERRYGEO_REPO: &str = "https://perrygeo.googlecode.com/hg/";

/// Name of the tile whose south west corner is at (`lon`, `lat`).
pub fn tile_name(lon: i32, lat: i32) -> String {
    format!(
        "{}{:02}{}{:03}",
        if lat < 0 { 'S' } else { 'N' },
        lat.unsigned_abs(),
        if lon < 0 { 'W' } else { 'E' },
        lon.unsigned_abs()
    )
}

/// Tiles covering `[minx, miny, maxx, maxy]`.
pub fn tiles_for_extent(extent: [f64; 4]) -> Vec<String> {
    let [minx, miny, maxx, maxy] = extent;
    let mut tiles = Vec::new();
    for lon in (minx.floor() as i32)..(maxx.ceil() as i32) {
        for lat in (miny.floor() as i32)..(maxy.ceil() as i32) {
            tiles.push(tile_name(lon, lat));
        }
    }
    tiles
}

#[derive(Debug)]
pub struct SrtmData {
    env: RunEnv,
    srtm_dir: PathBuf,
    perrygeo_dir: PathBuf,
    tiles: Vec<String>,
}

impl SrtmData {
    const PHASES: &'static [Phase] = &[
        Phase::SystemSetup,
        Phase::Download,
        Phase::Build,
        Phase::LoadData,
        Phase::LoadDataClean,
    ];

    pub fn new(env: &RunEnv) -> Self {
        Self {
            env: env.clone(),
            srtm_dir: env.data_dir().join("srtm"),
            perrygeo_dir: env.build_dir().join("perrygeo"),
            tiles: tiles_for_extent(env.config.extent),
        }
    }

    fn hillshade(&self) -> PathBuf {
        self.perrygeo_dir.join("demtools").join("bin").join("hillshade")
    }

    fn tile_file(tile: &str) -> String {
        format!("{}.hgt.zip", tile)
    }

    fn custom_resources(&self) -> Vec<(Resource, String)> {
        self.env
            .config
            .srtm_hgt_urls
            .iter()
            .map(|hgt| (Resource::new(hgt.url.as_str()), hgt.filename.clone()))
            .collect()
    }

    /// Public tiles not replaced by a custom file.
    fn tile_resources(&self) -> Vec<Resource> {
        let custom: Vec<&str> = self
            .env
            .config
            .srtm_hgt_urls
            .iter()
            .map(|hgt| hgt.filename.as_str())
            .collect();
        self.tiles
            .iter()
            .filter(|tile| !custom.contains(&Self::tile_file(tile).as_str()))
            .map(|tile| Resource::new(self.env.config.srtm_tile_url.replace("{tile}", tile)))
            .collect()
    }

    fn system_setup(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        install_packages(cx.runner, &["postgis", "gdal-bin", "python-gdal"])?;
        if self.env.config.use_hillshading {
            install_packages(cx.runner, &["mercurial", "libgdal1-dev"])?;
        }
        Ok(())
    }

    fn download(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        make_dirs_as_project_owner(&self.env.project_dir, &self.srtm_dir)?;

        for (resource, filename) in self.custom_resources() {
            let target = self.srtm_dir.join(&filename);
            if target.is_file() {
                continue;
            }
            cx.fetcher.fetch(&resource)?;
            copy_file(&cx.fetcher.locate(&resource), &target, true)?;
        }

        cx.fetch_all(&self.tile_resources())?;

        if !self.env.config.use_hillshading || self.perrygeo_dir.is_dir() {
            return Ok(());
        }
        cx.runner.run(
            &Cmd::new("hg")
                .args(["clone", PERRYGEO_REPO, "perrygeo"])
                .dir(self.env.build_dir()),
        )?;
        apply_patches(cx.runner, &self.env.patches_dir("perrygeo"), &self.perrygeo_dir)?;
        let bin = self.perrygeo_dir.join("demtools").join("bin");
        std::fs::create_dir_all(&bin).with_context(|| format!("cannot create {}", bin.display()))
    }

    fn build(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        if !self.env.config.use_hillshading {
            return Ok(());
        }
        if self.hillshade().is_file() {
            output::skip("hillshade already built");
            return Ok(());
        }
        cx.runner
            .run(&Cmd::new("make").dir(self.perrygeo_dir.join("demtools")))
    }

    /// Archive to unpack for a tile: the custom replacement if there is one.
    fn tile_archive(&self, cx: &PhaseContext<'_>, tile: &str) -> PathBuf {
        let custom = self.srtm_dir.join(Self::tile_file(tile));
        if custom.is_file() {
            return custom;
        }
        let url = self.env.config.srtm_tile_url.replace("{tile}", tile);
        cx.fetcher.locate(&Resource::new(url))
    }

    fn build_merged_hgt(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let dir = &self.srtm_dir;
        if dir.join(MERGED).is_file() {
            return Ok(());
        }
        make_dirs_as_project_owner(&self.env.project_dir, dir)?;

        for path in glob_in(dir, "contours*")? {
            if !path.ends_with(HILLSHADING) {
                maybe_unlink(&path)?;
            }
        }

        output::sub_action("uncompressing .hgt files");
        let mut to_merge = Vec::new();
        for tile in &self.tiles {
            extract(&self.tile_archive(cx, tile), dir)?;
            to_merge.push(format!("{}.hgt", tile));
        }

        let size = self.env.config.srtm_resize_dimension;
        if size > 0 {
            output::sub_action("warping .hgt files");
            for file in &to_merge {
                let tmp = format!("{}_tmp", file);
                maybe_unlink(&dir.join(&tmp))?;
                cx.runner.run(
                    &Cmd::new("gdalwarp")
                        .args(["-rcs", "-order", "3", "-ts"])
                        .args([size.to_string(), size.to_string()])
                        .arg("-multi")
                        .args([file.as_str(), tmp.as_str()])
                        .dir(dir),
                )?;
                std::fs::rename(dir.join(&tmp), dir.join(file))
                    .with_context(|| format!("cannot replace {}", file))?;
            }
        }

        output::sub_action("merging .hgt files together");
        cx.runner.run(
            &Cmd::new("gdal_merge.py")
                .args(["-o", MERGED])
                .args(to_merge.iter().map(String::as_str))
                .dir(dir),
        )?;
        for path in glob_in(dir, "[NS]*hgt")? {
            maybe_unlink(&path)?;
        }
        Ok(())
    }

    fn populate_contours_table(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let psql = cx.unit::<SetupDatabase>(SETUP_DATABASE)?.psql();
        let probe = format!("select * from \"{}\" limit 1", CONTOURS_TABLE);
        if psql.query_succeeds(cx.runner, &probe)? {
            output::skip("contours table already loaded");
            return Ok(());
        }

        let dir = &self.srtm_dir;
        let srid = self.env.config.srid_osm;

        output::sub_action("generating contours shapefile");
        for ext in ["shp", "shx", "dbf", "prj"] {
            maybe_unlink(&dir.join(format!("contours.{}", ext)))?;
        }
        cx.runner.run(
            &Cmd::new("gdal_contour")
                .arg("-i")
                .arg(CONTOURS_INTERVAL.to_string())
                .arg("-snodata")
                .arg(NO_DATA_VALUE.to_string())
                .args(["-a", "height", MERGED, "contours.shp"])
                .dir(dir),
        )?;

        output::sub_action("reprojecting shapefile");
        cx.runner.run(
            &Cmd::new("ogr2ogr")
                .arg("-t_srs")
                .arg(format!("EPSG:{}", srid))
                .args(["contours_reprojected.shp", "contours.shp"])
                .dir(dir),
        )?;

        output::sub_action("loading contours into the database");
        psql.execute_piped(
            cx.runner,
            &format!(
                "shp2pgsql -s {} -g {} -I contours_reprojected.shp {}",
                srid, GEOCOLUMN, CONTOURS_TABLE
            ),
            dir,
        )
    }

    fn create_hillshading(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let dir = &self.srtm_dir;
        if dir.join(HILLSHADING).is_file() {
            return Ok(());
        }

        maybe_unlink(&dir.join("contours.tif"))?;
        cx.runner.run(
            &Cmd::new("gdal_translate")
                .args(["-co", "TILED=YES", MERGED, "contours.tif"])
                .dir(dir),
        )?;

        maybe_unlink(&dir.join("contours_warped.tif"))?;
        cx.runner.run(
            &Cmd::new("gdalwarp")
                .args(["-co", "TILED=YES"])
                .arg("-srcnodata")
                .arg(NO_DATA_VALUE.to_string())
                .args(["-t_srs", "+init=esri.extra:900913"])
                .args(["-rcs", "-order", "3", "-tr", "30", "30", "-multi"])
                .args(["contours.tif", "contours_warped.tif"])
                .dir(dir),
        )?;

        cx.runner.run(
            &Cmd::new(self.hillshade().to_string_lossy())
                .args(["contours_warped.tif", HILLSHADING, "-z2"])
                .dir(dir),
        )
    }

    fn load_data(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        self.build_merged_hgt(cx)?;
        self.populate_contours_table(cx)?;
        if self.env.config.use_hillshading {
            self.create_hillshading(cx)?;
        }
        Ok(())
    }

    fn load_data_clean(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        maybe_unlink(&self.srtm_dir.join(MERGED))?;
        maybe_unlink(&self.srtm_dir.join(HILLSHADING))?;
        cx.unit::<SetupDatabase>(SETUP_DATABASE)?
            .psql()
            .drop_geometry_table(cx.runner, CONTOURS_TABLE)
    }
}

fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = dir.join(pattern);
    let paths = glob::glob(&full.to_string_lossy())
        .with_context(|| format!("bad glob pattern {}", full.display()))?
        .filter_map(|p| p.ok())
        .collect();
    Ok(paths)
}

impl Unit for SrtmData {
    fn name(&self) -> &str {
        SRTM_DATA
    }

    fn dependencies(&self) -> Vec<DependencySpec> {
        vec![DependencySpec::of(SETUP_DATABASE)]
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::SystemSetup => self.system_setup(cx),
            Phase::Download => self.download(cx),
            Phase::Build => self.build(cx),
            Phase::LoadData => self.load_data(cx),
            Phase::LoadDataClean => self.load_data_clean(cx),
            _ => Ok(()),
        }
    }
}

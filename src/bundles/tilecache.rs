//! TileCache: tile cache directory, per-instance layer config and seeding.

use super::{TILECACHE, extent_osm, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::privilege::lookup_group;
use crate::core::unit::{PhaseContext, Unit};
use crate::fetch::Resource;
use crate::helpers::cmd::Cmd;
use crate::helpers::fs::{make_dirs_as_project_owner, maybe_unlink};
use crate::helpers::packages::install_packages;
use anyhow::{Context, Result};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

const VERSION: &str = "2.11";
const ARCHIVE_MD5: &str = "ff0153452a9e88a8d00405fb58d689df";

/// Group Apache runs TileCache under. The cache directory is group
/// writable and setgid so both Apache and the operator can write tiles.
const TILECACHE_GROUP: &str = "www-data";

const MAPNIK_START: &str = "@@MAPNIK_START@@\n";
const MAPNIK_END: &str = "@@MAPNIK_END@@\n";

/// Repeat the block between the Mapnik markers once per instance, with
/// `@@MAPNIK_NAME@@` replaced. `None` when there are no markers.
pub fn expand_mapnik_layers(content: &str, instances: &[String]) -> Option<String> {
    let (before, rest) = content.split_once(MAPNIK_START)?;
    let (template, after) = rest.split_once(MAPNIK_END)?;

    let mut out = before.to_string();
    for name in instances {
        out.push_str(&template.replace("@@MAPNIK_NAME@@", name));
        out.push('\n');
    }
    out.push_str(after);
    Some(out)
}

#[derive(Debug)]
pub struct TileCache {
    env: RunEnv,
    tc_dir: PathBuf,
    cache_dir: PathBuf,
}

impl TileCache {
    const PHASES: &'static [Phase] = &[
        Phase::SystemSetup,
        Phase::Download,
        Phase::Build,
        Phase::Generate,
        Phase::GenerateClean,
    ];

    pub fn new(env: &RunEnv) -> Self {
        Self {
            env: env.clone(),
            tc_dir: env.build_dir().join("tilecache"),
            cache_dir: env.data_dir().join("tiles").join("tc_cache"),
        }
    }

    fn config_file(&self) -> PathBuf {
        self.env.project_path("tilecache").join("tilecache.cfg")
    }

    /// Layers to seed: one per Mapnik instance, then MapServer.
    pub fn seed_layers(&self) -> Vec<String> {
        let c = &self.env.config;
        let mut layers: Vec<String> = c
            .mapnik_instances
            .iter()
            .map(|name| format!("mapnik_{}", name))
            .collect();
        if c.use_mapserver {
            layers.push("mapserver".into());
        }
        layers.retain(|layer| !c.tilecache_noseed_layers.contains(layer));
        layers
    }

    fn system_setup(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        install_packages(cx.runner, &["python-imaging"])?;
        if self.env.config.use_apache {
            install_packages(cx.runner, &["libapache2-mod-wsgi", "python-paste"])?;
        }

        make_dirs_as_project_owner(&self.env.project_dir, &self.cache_dir)?;
        let gid = lookup_group(TILECACHE_GROUP)?;
        std::os::unix::fs::chown(&self.cache_dir, None, Some(gid))
            .with_context(|| format!("cannot chgrp {}", self.cache_dir.display()))?;
        std::fs::set_permissions(&self.cache_dir, std::fs::Permissions::from_mode(0o2770))
            .with_context(|| format!("cannot chmod {}", self.cache_dir.display()))?;

        output::warning(&format!(
            "you must add the user running this tool to the {:?} group (then log in again) \
             so that tiles can be written by both Apache and that user",
            TILECACHE_GROUP
        ));
        if !self.env.options.non_interactive {
            output::pause("press enter to continue...")?;
        }
        Ok(())
    }

    fn download(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        cx.fetch_all(&[Resource::new(format!("http://tilecache.org/tilecache-{}.tar.gz", VERSION))
            .extract_to("build")
            .checksum(ARCHIVE_MD5)])?;

        // the archive unpacks to a versioned directory
        let pattern = self.env.build_dir().join("tilecache-*");
        let unpacked = glob::glob(&pattern.to_string_lossy())
            .with_context(|| format!("bad glob pattern {}", pattern.display()))?
            .filter_map(|p| p.ok())
            .find(|p| p.is_dir());
        let Some(unpacked) = unpacked else {
            return Ok(());
        };
        maybe_unlink(&self.tc_dir)?;
        std::fs::rename(&unpacked, &self.tc_dir)
            .with_context(|| format!("cannot rename {}", unpacked.display()))
    }

    fn build(&self) -> Result<()> {
        let path = self.config_file();
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let Some(expanded) = expand_mapnik_layers(&content, &self.env.config.mapnik_instances)
        else {
            return Ok(());
        };
        std::fs::write(&path, expanded).with_context(|| format!("cannot write {}", path.display()))
    }

    fn generate(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let c = &self.env.config;
        let seed = self.tc_dir.join("tilecache_seed.py");
        let bbox: Vec<String> = extent_osm(cx.env, cx.runner)?
            .iter()
            .map(f64::to_string)
            .collect();

        for layer in self.seed_layers() {
            output::sub_action(&format!("seeding layer {}", layer));
            cx.runner.run(
                &Cmd::new(seed.to_string_lossy())
                    .arg("-c")
                    .arg(self.config_file().to_string_lossy())
                    .arg("-b")
                    .arg(bbox.join(","))
                    .arg(layer)
                    .arg(c.seed_zoom_from.to_string())
                    .arg((c.seed_zoom_to + 1).to_string()),
            )?;
        }
        Ok(())
    }

    fn generate_clean(&self) -> Result<()> {
        let entries = std::fs::read_dir(&self.cache_dir)
            .with_context(|| format!("cannot read {}", self.cache_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            std::fs::remove_dir_all(&path)
                .with_context(|| format!("cannot remove {}", path.display()))?;
        }
        Ok(())
    }
}

impl Unit for TileCache {
    fn name(&self) -> &str {
        TILECACHE
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::SystemSetup => self.system_setup(cx),
            Phase::Download => self.download(cx),
            Phase::Build => self.build(),
            Phase::Generate => self.generate(cx),
            Phase::GenerateClean => self.generate_clean(),
            _ => Ok(()),
        }
    }
}

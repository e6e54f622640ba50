//! Apache site wiring and the OpenLayers client.

use super::{APACHE_CONFIG, OPENLAYERS};
use crate::core::phase::Phase;
use crate::core::unit::{PhaseContext, Unit};
use crate::fetch::Resource;
use crate::helpers::packages::install_packages;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const SITES_ENABLED: &str = "/etc/apache2/sites-enabled";

/// Point `link` at `target`, replacing whatever is there unless it already
/// does.
pub fn ensure_symlink(target: &Path, link: &Path) -> Result<bool> {
    if std::fs::read_link(link).is_ok_and(|current| current == target) {
        return Ok(false);
    }
    match std::fs::remove_file(link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("cannot remove {}", link.display())),
    }
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("cannot link {} to {}", link.display(), target.display()))?;
    Ok(true)
}

/// Enables the project's Apache site.
#[derive(Debug)]
pub struct ApacheConfig;

impl Unit for ApacheConfig {
    fn name(&self) -> &str {
        APACHE_CONFIG
    }

    fn supports(&self, phase: Phase) -> bool {
        phase == Phase::SystemSetup
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        if phase != Phase::SystemSetup {
            return Ok(());
        }
        // prefork: the worker MPM has trouble running CGI scripts like mapserv
        install_packages(cx.runner, &["apache2", "apache2-mpm-prefork"])?;

        let link = PathBuf::from(SITES_ENABLED).join(&cx.env.config.apache_server_name);
        let target = cx.env.project_path("apache").join("apache.conf");
        if ensure_symlink(&target, &link)? {
            tracing::info!(link = %link.display(), target = %target.display(), "enabled apache site");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct OpenLayers;

impl Unit for OpenLayers {
    fn name(&self) -> &str {
        OPENLAYERS
    }

    fn supports(&self, phase: Phase) -> bool {
        phase == Phase::Download
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        if phase != Phase::Download {
            return Ok(());
        }
        cx.fetch_all(&[Resource::new("http://openlayers.org/download/OpenLayers-2.10.tar.gz")
            .extract_to("htdocs")
            .checksum("4fdb8d5bf731168a65add0fabe9234dd")])
    }
}

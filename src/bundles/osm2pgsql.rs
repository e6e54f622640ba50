//! osm2pgsql, built from a pinned subversion revision.

use super::{OSM2PGSQL_BUILD, make_jobs, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{PhaseContext, Unit};
use crate::helpers::cmd::Cmd;
use crate::helpers::packages::install_packages;
use crate::helpers::svn::SvnCheckout;
use anyhow::Result;
use std::path::{Path, PathBuf};

const PACKAGES: &[&str] = &[
    "subversion",
    "build-essential",
    "libxml2-dev",
    "libgeos-dev",
    "libpq-dev",
    "libbz2-dev",
    "proj",
    "autoconf",
    "libtool",
];

#[derive(Debug)]
pub struct Osm2pgsqlBuild {
    checkout: SvnCheckout,
}

impl Osm2pgsqlBuild {
    const PHASES: &'static [Phase] = &[Phase::SystemSetup, Phase::Download, Phase::Build];

    pub fn new(env: &RunEnv) -> Self {
        let url = &env.config.osm2pgsql_svn_url;
        let dir = SvnCheckout::source_dir(&env.build_dir(), url);
        Self {
            checkout: SvnCheckout::new(url.as_str(), env.config.osm2pgsql_svn_revision.as_str(), dir),
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.checkout.dir
    }

    /// The built executable.
    pub fn binary(&self) -> PathBuf {
        self.checkout.dir.join("osm2pgsql")
    }

    /// Style shipped with the sources, used when none is configured.
    pub fn default_style(&self) -> PathBuf {
        self.checkout.dir.join("default.style")
    }

    fn build(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        if self.binary().is_file() {
            output::skip("osm2pgsql already built");
            return Ok(());
        }

        let dir = self.source_dir();
        let script = |name: &str| Cmd::new(dir.join(name).to_string_lossy()).dir(dir);
        cx.runner.run(&script("autogen.sh"))?;
        cx.runner.run(&script("configure"))?;
        cx.runner.run(
            &Cmd::shell("sed -i 's/-g -O2/-O2 -march=native -fomit-frame-pointer/' Makefile").dir(dir),
        )?;
        cx.runner
            .run(&Cmd::new("make").arg("-j").arg(make_jobs()).dir(dir))
    }
}

impl Unit for Osm2pgsqlBuild {
    fn name(&self) -> &str {
        OSM2PGSQL_BUILD
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::SystemSetup => install_packages(cx.runner, PACKAGES),
            Phase::Download => self.checkout.fetch(cx.runner),
            Phase::Build => self.build(cx),
            _ => Ok(()),
        }
    }
}

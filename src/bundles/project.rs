//! The core unit: project skeleton and `.in` file rendering.

use super::{extent_osm, supports};
use crate::core::context::RunEnv;
use crate::core::output;
use crate::core::phase::Phase;
use crate::core::unit::{CORE_KIND, PhaseContext, Unit};
use crate::helpers::cmd::CommandRunner;
use crate::helpers::packages::install_packages;
use crate::helpers::template::{copy_tree, render_dot_in_files};
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Runs first in every run.
#[derive(Debug, Default)]
pub struct CoreBundle;

impl CoreBundle {
    const PHASES: &'static [Phase] = &[Phase::CreateProject, Phase::SystemSetup, Phase::Build];

    pub fn new() -> Self {
        Self
    }

    fn create_project(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let env = cx.env;
        let copied = copy_tree(&env.template_dir(), &env.project_dir, env.options.overwrite)?;
        output::detail(&format!("copied {} template files", copied));
        Ok(())
    }

    fn build(&self, cx: &mut PhaseContext<'_>) -> Result<()> {
        let vars = template_vars(cx.env, cx.runner);
        let rendered = render_dot_in_files(&cx.env.project_dir, &vars)?;
        for path in &rendered {
            tracing::debug!(path = %path.display(), "generated file");
        }
        output::detail(&format!("rendered {} files", rendered.len()));
        Ok(())
    }
}

/// Configuration values plus the derived variables templates use.
pub fn template_vars(env: &RunEnv, runner: &dyn CommandRunner) -> BTreeMap<String, String> {
    let c = &env.config;
    let mut vars = c.template_vars();

    vars.insert(
        "DOCUMENT_ROOT".into(),
        env.project_path("htdocs").display().to_string(),
    );
    vars.insert("PROJECT_DIR".into(), env.project_dir.display().to_string());
    vars.insert("APACHE_SERVER_ALIASES".into(), c.apache_server_aliases.join(" "));
    vars.insert(
        "USE_TILECACHE_COMMENT".into(),
        if c.use_tilecache { "" } else { "#" }.into(),
    );

    // proj may not be installed yet on a fresh machine
    match extent_osm(env, runner) {
        Ok(extent) => {
            let joined: Vec<String> = extent.iter().map(f64::to_string).collect();
            vars.insert("EXTENT_OSM".into(), format!("[{}]", joined.join(", ")));
        }
        Err(e) => tracing::warn!(error = %e, "cannot compute EXTENT_OSM"),
    }

    let built = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    vars.insert(
        "BUILD_INFO".into(),
        format!("Built with osm-server-setup at unix time {}", built),
    );
    vars
}

impl Unit for CoreBundle {
    fn name(&self) -> &str {
        CORE_KIND
    }

    fn supports(&self, phase: Phase) -> bool {
        supports(Self::PHASES, phase)
    }

    fn run_phase(&mut self, phase: Phase, cx: &mut PhaseContext<'_>) -> Result<()> {
        match phase {
            Phase::CreateProject => self.create_project(cx),
            Phase::SystemSetup => install_packages(cx.runner, &["unzip"]),
            Phase::Build => self.build(cx),
            _ => Ok(()),
        }
    }
}

//! Debian package installation and source patching.

use crate::core::output;
use crate::helpers::cmd::{Cmd, CommandRunner};
use anyhow::{Context, Result};
use std::path::Path;

/// Install the packages `dpkg` does not already report as installed.
pub fn install_packages(runner: &dyn CommandRunner, packages: &[&str]) -> Result<()> {
    let mut to_install = Vec::new();
    for package in packages {
        let probe = Cmd::shell(format!(
            "dpkg -s {} | grep -q 'Status:.*\\sinstalled'",
            package
        ));
        if !runner.succeeds(&probe)? {
            to_install.push(*package);
        }
    }
    if to_install.is_empty() {
        return Ok(());
    }

    output::sub_action(&format!("installing packages: {}", to_install.join(" ")));
    runner.run(&Cmd::new("aptitude").args(["-y", "install"]).args(to_install))
}

/// Apply every `*.diff` in `patches_dir` (sorted by name) with `patch -p1`.
pub fn apply_patches(runner: &dyn CommandRunner, patches_dir: &Path, target_dir: &Path) -> Result<()> {
    let mut patches: Vec<_> = std::fs::read_dir(patches_dir)
        .with_context(|| format!("cannot read {}", patches_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "diff"))
        .collect();
    patches.sort();

    for patch in patches {
        tracing::debug!(patch = %patch.display(), "applying patch");
        runner.run(
            &Cmd::new("patch")
                .args(["-p1", "-i"])
                .arg(patch.to_string_lossy())
                .dir(target_dir),
        )?;
    }
    Ok(())
}

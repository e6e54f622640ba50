//! Project template copying and `.in` file rendering
//!
//! `foo.conf.in` renders to `foo.conf` with every `@@KEY@@` replaced by the
//! value of `KEY`. Unknown placeholders are left as they are.

use crate::helpers::fs::copy_file;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories under the project root that never hold `.in` files.
pub const RENDER_EXCLUDES: [&str; 6] = ["data", "osm-server-setup", ".git", ".hg", ".svn", "build"];

/// Replace `@@KEY@@` placeholders.
pub fn render(content: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = content.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("@@{}@@", key), value);
    }
    out
}

/// Copy every file below `src` into `dest`, keeping relative paths.
///
/// An existing target file is an error unless `overwrite` is set. Returns
/// the number of files copied.
pub fn copy_tree(src: &Path, dest: &Path, overwrite: bool) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.with_context(|| format!("cannot walk {}", src.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if target.exists() && !overwrite {
            bail!(
                "target {} already exists, not replacing (use --overwrite)",
                target.display()
            );
        }
        copy_file(entry.path(), &target, true)?;
        copied += 1;
    }
    Ok(copied)
}

/// Render every `*.in` file below `root` next to itself, without the suffix.
///
/// `GENERATED_WARNING` is set per file to point readers at the source.
/// Returns the generated paths.
pub fn render_dot_in_files(root: &Path, vars: &BTreeMap<String, String>) -> Result<Vec<PathBuf>> {
    let mut generated = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.depth() > 0
                && e.file_type().is_dir()
                && RENDER_EXCLUDES.iter().any(|x| e.file_name() == *x))
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("cannot walk {}", root.display()))?;
        let source = entry.path();
        if !entry.file_type().is_file() || source.extension().is_none_or(|ext| ext != "in") {
            continue;
        }
        let target = source.with_extension("");
        tracing::debug!(source = %source.display(), target = %target.display(), "generating file");

        let content = std::fs::read_to_string(source)
            .with_context(|| format!("cannot read {}", source.display()))?;
        let mut file_vars = vars.clone();
        file_vars.insert(
            "GENERATED_WARNING".into(),
            format!(
                "Warning, this file is generated from {}. Edit that file instead and run the build phase.",
                source.display()
            ),
        );
        std::fs::write(&target, render(&content, &file_vars))
            .with_context(|| format!("cannot write {}", target.display()))?;

        let perms = entry.metadata()?.permissions();
        if let Err(e) = std::fs::set_permissions(&target, perms) {
            // Happens when the file belongs to someone else.
            tracing::warn!(path = %target.display(), error = %e, "cannot update mode");
        }
        generated.push(target);
    }
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_render_replaces_known_keys() {
        let out = render(
            "ServerName @@APACHE_SERVER_NAME@@ # @@UNKNOWN@@",
            &vars(&[("APACHE_SERVER_NAME", "carto")]),
        );
        assert_eq!(out, "ServerName carto # @@UNKNOWN@@");
    }

    #[test]
    fn test_render_dot_in_files_skips_excluded_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("htdocs")).unwrap();
        std::fs::create_dir_all(dir.path().join("build/mapnik")).unwrap();
        std::fs::write(dir.path().join("htdocs/index.html.in"), "db=@@DB_NAME@@").unwrap();
        std::fs::write(dir.path().join("build/mapnik/x.in"), "@@DB_NAME@@").unwrap();

        let generated = render_dot_in_files(dir.path(), &vars(&[("DB_NAME", "gis")])).unwrap();

        assert_eq!(generated, vec![dir.path().join("htdocs/index.html")]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("htdocs/index.html")).unwrap(),
            "db=gis"
        );
        assert!(!dir.path().join("build/mapnik/x").exists());
    }

    #[test]
    fn test_generated_warning_names_source() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.conf.in"), "# @@GENERATED_WARNING@@").unwrap();
        render_dot_in_files(dir.path(), &BTreeMap::new()).unwrap();
        let out = std::fs::read_to_string(dir.path().join("a.conf")).unwrap();
        assert!(out.contains("a.conf.in"));
    }

    #[test]
    fn test_copy_tree_refuses_overwrite() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("conf")).unwrap();
        std::fs::write(src.path().join("conf/apache.conf.in"), "x").unwrap();

        assert_eq!(copy_tree(src.path(), dest.path(), false).unwrap(), 1);
        assert!(dest.path().join("conf/apache.conf.in").exists());
        assert!(copy_tree(src.path(), dest.path(), false).is_err());
        assert_eq!(copy_tree(src.path(), dest.path(), true).unwrap(), 1);
    }
}

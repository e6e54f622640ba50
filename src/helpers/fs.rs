//! Filesystem helpers.

use crate::core::privilege::{Privilege, owner_of};
use anyhow::{Context, Result};
use std::path::Path;

/// Delete a file or directory tree, ignoring a missing path.
///
/// Returns whether anything was removed.
pub fn maybe_unlink(path: &Path) -> Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("cannot stat {}", path.display())),
    };
    let removed = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.with_context(|| format!("cannot remove {}", path.display()))?;
    Ok(true)
}

/// Create `path` (and parents). When running as root, every directory that
/// had to be created is handed to the owner of `project_dir`.
pub fn make_dirs_as_project_owner(project_dir: &Path, path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut missing = Vec::new();
    let mut cur = Some(path);
    while let Some(dir) = cur {
        if dir.exists() {
            break;
        }
        missing.push(dir.to_path_buf());
        cur = dir.parent();
    }

    std::fs::create_dir_all(path)
        .with_context(|| format!("cannot create directory {}", path.display()))?;

    if Privilege::current().elevated {
        let owner = owner_of(project_dir)?;
        for dir in missing.iter().rev() {
            std::os::unix::fs::chown(dir, Some(owner.uid), Some(owner.gid))
                .with_context(|| format!("cannot chown {}", dir.display()))?;
        }
    }
    Ok(())
}

/// Copy `src` to `dest`, creating parent directories. Returns false without
/// touching anything when `dest` exists and `overwrite` is off.
pub fn copy_file(src: &Path, dest: &Path, overwrite: bool) -> Result<bool> {
    if dest.exists() && !overwrite {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create directory {}", parent.display()))?;
    }
    std::fs::copy(src, dest)
        .with_context(|| format!("cannot copy {} to {}", src.display(), dest.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_maybe_unlink_file_and_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "x").unwrap();
        let tree = dir.path().join("tree/nested");
        std::fs::create_dir_all(&tree).unwrap();

        assert!(maybe_unlink(&file).unwrap());
        assert!(maybe_unlink(&dir.path().join("tree")).unwrap());
        assert!(!file.exists());
        assert!(!tree.exists());
    }

    #[test]
    fn test_maybe_unlink_missing() {
        let dir = TempDir::new().unwrap();
        assert!(!maybe_unlink(&dir.path().join("nope")).unwrap());
    }

    #[test]
    fn test_make_dirs_creates_nested() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data/download_cache");
        make_dirs_as_project_owner(dir.path(), &target).unwrap();
        assert!(target.is_dir());
        // second call is a no-op
        make_dirs_as_project_owner(dir.path(), &target).unwrap();
    }

    #[test]
    fn test_copy_file_respects_overwrite() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("out/dest.txt");
        std::fs::write(&src, "new").unwrap();

        assert!(copy_file(&src, &dest, false).unwrap());
        std::fs::write(&dest, "edited").unwrap();
        assert!(!copy_file(&src, &dest, false).unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "edited");
        assert!(copy_file(&src, &dest, true).unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new");
    }
}

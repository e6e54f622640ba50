//! Unpacking of cached archives into the project tree.
//!
//! Handles the formats the bundles download (`.tar.gz`/`.tgz`,
//! `.tar.bz2`/`.tbz2` and `.zip`) in-process. Entries that would escape the
//! destination are refused with [`Error::UnsafeArchiveEntry`].

use crate::core::error::Error;
use crate::core::output;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

/// Archive formats the cache can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarBz2,
    Zip,
}

const SUFFIXES: [(&str, ArchiveFormat); 6] = [
    (".tar.gz", ArchiveFormat::TarGz),
    (".tgz", ArchiveFormat::TarGz),
    (".tar.bz2", ArchiveFormat::TarBz2),
    (".tbz2", ArchiveFormat::TarBz2),
    (".tbz", ArchiveFormat::TarBz2),
    (".zip", ArchiveFormat::Zip),
];

impl ArchiveFormat {
    /// Format implied by the file name, if any.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix))
            .map(|(_, format)| *format)
    }
}

/// Keeps every write of one extraction inside `root`.
struct Confinement<'a> {
    root: &'a Path,
}

impl<'a> Confinement<'a> {
    fn refuse(what: impl Into<String>) -> anyhow::Error {
        Error::UnsafeArchiveEntry { entry: what.into() }.into()
    }

    /// Destination for a relative entry name.
    fn place(&self, name: &Path) -> Result<PathBuf> {
        let escapes = name
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Self::refuse(name.display().to_string()));
        }
        let target = self.root.join(name);
        self.no_symlinks_on_the_way(&target)?;
        Ok(target)
    }

    /// An earlier entry may have planted a symlink we would write through.
    fn no_symlinks_on_the_way(&self, target: &Path) -> Result<()> {
        let Ok(rel) = target.strip_prefix(self.root) else {
            return Err(Self::refuse(target.display().to_string()));
        };
        let mut cur = self.root.to_path_buf();
        for part in rel.components() {
            cur.push(part);
            let is_link = std::fs::symlink_metadata(&cur)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_link {
                return Err(Self::refuse(format!("writes through symlink {}", cur.display())));
            }
        }
        Ok(())
    }

    /// A symlink target must stay below the root, resolved from the
    /// entry's directory.
    fn symlink_target(&self, entry: &Path, target: &Path) -> Result<()> {
        if target.has_root() {
            return Err(Self::refuse(format!(
                "{} links to absolute path {}",
                entry.display(),
                target.display()
            )));
        }
        let mut depth = entry.components().count() as i64 - 1;
        for part in target.components() {
            match part {
                Component::ParentDir => depth -= 1,
                Component::Normal(_) => depth += 1,
                _ => {}
            }
            if depth < 0 {
                return Err(Self::refuse(format!(
                    "{} links outside the destination ({})",
                    entry.display(),
                    target.display()
                )));
            }
        }
        Ok(())
    }

    /// Hard link names are archive-relative and must name a file already
    /// unpacked under the root.
    fn hard_link_source(&self, entry: &Path, source: &Path) -> Result<PathBuf> {
        let resolved = self.place(source)?;
        let is_file = std::fs::symlink_metadata(&resolved)
            .map(|m| m.file_type().is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(Self::refuse(format!(
                "{} hard-links to {} which is not in the archive",
                entry.display(),
                source.display()
            )));
        }
        Ok(resolved)
    }

    fn parent_dirs(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        Ok(())
    }
}

fn unpack_tar(stream: impl Read, jail: &Confinement<'_>) -> Result<()> {
    let mut archive = tar::Archive::new(stream);
    for entry in archive.entries().context("cannot read tar stream")? {
        let mut entry = entry.context("corrupt tar entry")?;
        let name = entry.path().context("bad tar entry name")?.into_owned();
        if name.as_os_str().is_empty() || name == Path::new(".") {
            continue;
        }
        let target = jail.place(&name)?;

        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            let Some(link) = entry.link_name().context("bad link target")? else {
                return Err(Confinement::refuse(format!("{} has no link target", name.display())));
            };
            if kind.is_hard_link() {
                let source = jail.hard_link_source(&name, &link)?;
                jail.parent_dirs(&target)?;
                if std::fs::symlink_metadata(&target).is_ok() {
                    std::fs::remove_file(&target)
                        .with_context(|| format!("cannot replace {}", target.display()))?;
                }
                std::fs::hard_link(&source, &target).with_context(|| {
                    format!("cannot link {} to {}", name.display(), link.display())
                })?;
                continue;
            }
            jail.symlink_target(&name, &link)?;
        }

        jail.parent_dirs(&target)?;
        entry
            .unpack(&target)
            .with_context(|| format!("cannot unpack {}", name.display()))?;
    }
    Ok(())
}

fn unpack_zip(file: File, jail: &Confinement<'_>) -> Result<()> {
    let mut archive = zip::ZipArchive::new(file).context("cannot read zip directory")?;
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).context("corrupt zip entry")?;
        let Some(name) = member.enclosed_name() else {
            return Err(Confinement::refuse(member.name().to_string()));
        };
        let target = jail.place(&name)?;

        if member.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("cannot create {}", target.display()))?;
            continue;
        }
        jail.parent_dirs(&target)?;
        let mut out =
            File::create(&target).with_context(|| format!("cannot create {}", target.display()))?;
        std::io::copy(&mut member, &mut out)
            .with_context(|| format!("cannot write {}", target.display()))?;

        if let Some(mode) = member.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode)) {
                tracing::debug!(path = %target.display(), error = %e, "cannot set mode");
            }
        }
    }
    Ok(())
}

/// Unpack `archive` below `dest`, creating `dest` if needed.
///
/// Fails with [`Error::UnsupportedArchive`] for names that are not a known
/// tarball or zip suffix.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let format = ArchiveFormat::detect(archive).ok_or_else(|| Error::UnsupportedArchive {
        path: archive.display().to_string(),
    })?;
    std::fs::create_dir_all(dest).with_context(|| format!("cannot create {}", dest.display()))?;

    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = File::open(archive).with_context(|| format!("cannot open {}", archive.display()))?;
    let jail = Confinement { root: dest };

    let spinner = output::spinner(&format!("unpacking {}", name));
    let result = match format {
        ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(BufReader::new(file)), &jail),
        ArchiveFormat::TarBz2 => unpack_tar(bzip2::read::BzDecoder::new(BufReader::new(file)), &jail),
        ArchiveFormat::Zip => unpack_zip(file, &jail),
    };
    spinner.finish_and_clear();

    result.with_context(|| format!("cannot extract {}", name))?;
    output::detail(&format!("unpacked {} into {}", name, dest.display()));
    Ok(())
}

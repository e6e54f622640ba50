//! Privilege checks and account lookup
//!
//! The process never changes its own identity. Steps that must run as
//! another account pass a user to the command runner, which applies it to
//! the child process only.

use crate::core::error::Error;
use crate::core::phase::Phase;
use anyhow::{Context, Result, bail};
use std::ffi::CString;
use std::path::Path;

/// Effective identity of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Privilege {
    pub elevated: bool,
}

impl Privilege {
    pub fn current() -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        Self { elevated: euid == 0 }
    }

    pub fn elevated() -> Self {
        Self { elevated: true }
    }

    pub fn unprivileged() -> Self {
        Self { elevated: false }
    }

    /// Refuse a phase that runs under the wrong account.
    ///
    /// Privileged phases need root. Every other phase must not run as root
    /// unless `allow_root_all` is set, so build products keep the project
    /// owner's ownership.
    pub fn check(&self, phase: Phase, allow_root_all: bool) -> Result<(), Error> {
        if phase.is_privileged() && !self.elevated {
            return Err(Error::RequiresElevation {
                phase: phase.to_string(),
            });
        }
        if !phase.is_privileged() && self.elevated && !allow_root_all {
            return Err(Error::ElevationForbidden {
                phase: phase.to_string(),
            });
        }
        Ok(())
    }
}

/// Numeric ids of a system account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub uid: u32,
    pub gid: u32,
}

/// Look up a user by name in the system account database.
pub fn lookup_user(name: &str) -> Result<Account> {
    let c_name = CString::new(name).with_context(|| format!("invalid user name: {}", name))?;
    // SAFETY: c_name is a valid NUL-terminated string; the returned record is
    // only read before any other getpw* call.
    let entry = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if entry.is_null() {
        bail!("no such user: {}", name);
    }
    // SAFETY: entry is non-null and points to a static passwd record.
    let (uid, gid) = unsafe { ((*entry).pw_uid, (*entry).pw_gid) };
    Ok(Account { uid, gid })
}

/// Look up a group id by name.
pub fn lookup_group(name: &str) -> Result<u32> {
    let c_name = CString::new(name).with_context(|| format!("invalid group name: {}", name))?;
    // SAFETY: as in lookup_user.
    let entry = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if entry.is_null() {
        bail!("no such group: {}", name);
    }
    // SAFETY: entry is non-null and points to a static group record.
    Ok(unsafe { (*entry).gr_gid })
}

/// Owner of a path, used to hand directories created as root back to the
/// project owner.
pub fn owner_of(path: &Path) -> Result<Account> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path)
        .with_context(|| format!("cannot stat {}", path.display()))?;
    Ok(Account {
        uid: meta.uid(),
        gid: meta.gid(),
    })
}

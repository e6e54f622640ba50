//! Side-effect primitives used by bundles
//!
//! - **cmd**: external commands, optionally run as another account
//! - **fs**: unlink, project-owned directory creation, file copy
//! - **template**: project template copy and `@@KEY@@` rendering
//! - **svn**: revision-pinned checkouts
//! - **packages**: Debian packages and source patches
//! - **coords**: bounding box conversion with cs2cs

pub mod cmd;
pub mod coords;
pub mod fs;
pub mod packages;
pub mod svn;
pub mod template;

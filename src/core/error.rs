//! Error taxonomy for resolution, preconditions, integrity and commands.

use thiserror::Error;

/// Errors raised by the resolver, the executor and the download cache.
#[derive(Error, Debug)]
pub enum Error {
    #[error("no unit found for name: {name}")]
    UnitNotFound { name: String },

    #[error("expected exactly one unit named {name}, found {found}")]
    AmbiguousUnit { name: String, found: usize },

    #[error("unit {name} requested more than once")]
    DuplicateUnit { name: String },

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("unknown unit kind: {kind}")]
    UnknownKind { kind: String },

    #[error("factory built unit {actual} for dependency {expected}")]
    UnitNameMismatch { expected: String, actual: String },

    #[error("unknown phase: {name}")]
    UnknownPhase { name: String },

    #[error("phase {phase} must be run as root")]
    RequiresElevation { phase: String },

    #[error(
        "root can only run system_setup or system_setup_clean (got {phase}); \
         set OSS_ALLOW_ROOT_ALL_COMMANDS to override"
    )]
    ElevationForbidden { phase: String },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported archive format: {path}")]
    UnsupportedArchive { path: String },

    #[error("archive contains unsafe entry: {entry}")]
    UnsafeArchiveEntry { entry: String },

    #[error("download cache {path} is locked by another run")]
    CacheLocked { path: String },

    #[error("URL has no file name to cache under: {url}")]
    NoFileName { url: String },

    #[error("cleaning an extracted resource is not supported: {url}")]
    CleanExtractedUnsupported { url: String },

    #[error("command failed: {cmd} (exit code: {code:?})")]
    CommandFailed { cmd: String, code: Option<i32> },

    #[error("unit {unit} failed during {phase}")]
    PhaseFailed {
        unit: String,
        phase: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    /// True for errors detected before any unit ran.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::UnknownPhase { .. }
                | Self::RequiresElevation { .. }
                | Self::ElevationForbidden { .. }
                | Self::CacheLocked { .. }
        )
    }
}

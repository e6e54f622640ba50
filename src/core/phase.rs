//! Lifecycle phases a unit may implement.

use crate::core::error::Error;
use std::fmt;
use std::str::FromStr;

/// A named lifecycle operation.
///
/// Units opt into phases individually; running a phase skips every unit
/// that does not support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    CreateProject,
    SystemSetup,
    SystemSetupClean,
    Download,
    DownloadClean,
    Build,
    LoadData,
    LoadDataClean,
    Generate,
    GenerateClean,
    ReadReplication,
    LoadReplication,
}

impl Phase {
    pub const ALL: [Phase; 12] = [
        Phase::CreateProject,
        Phase::SystemSetup,
        Phase::SystemSetupClean,
        Phase::Download,
        Phase::DownloadClean,
        Phase::Build,
        Phase::LoadData,
        Phase::LoadDataClean,
        Phase::Generate,
        Phase::GenerateClean,
        Phase::ReadReplication,
        Phase::LoadReplication,
    ];

    /// Canonical (snake_case) name, as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProject => "create_project",
            Self::SystemSetup => "system_setup",
            Self::SystemSetupClean => "system_setup_clean",
            Self::Download => "download",
            Self::DownloadClean => "download_clean",
            Self::Build => "build",
            Self::LoadData => "load_data",
            Self::LoadDataClean => "load_data_clean",
            Self::Generate => "generate",
            Self::GenerateClean => "generate_clean",
            Self::ReadReplication => "read_replication",
            Self::LoadReplication => "load_replication",
        }
    }

    /// Phases that must run as root. Every other phase must not.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::SystemSetup | Self::SystemSetupClean)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| Error::UnknownPhase { name: s.to_string() })
    }
}

/// A parsed `unit:phase` or bare `phase` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub unit: Option<String>,
    pub phase: Phase,
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((unit, phase)) if !unit.is_empty() => Ok(Self {
                unit: Some(unit.to_string()),
                phase: phase.parse()?,
            }),
            Some((_, phase)) => Ok(Self {
                unit: None,
                phase: phase.parse()?,
            }),
            None => Ok(Self {
                unit: None,
                phase: s.parse()?,
            }),
        }
    }
}

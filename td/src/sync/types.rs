//! Sync configuration enums

use serde::{Deserialize, Serialize};

/// Which way changes are allowed to flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// TODO file → task database
    FileToApp,
    /// Task database → TODO file
    AppToFile,
    #[default]
    Bidirectional,
}

impl SyncDirection {
    pub fn allows_file_to_app(&self) -> bool {
        matches!(self, SyncDirection::FileToApp | SyncDirection::Bidirectional)
    }

    pub fn allows_app_to_file(&self) -> bool {
        matches!(self, SyncDirection::AppToFile | SyncDirection::Bidirectional)
    }
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::FileToApp => write!(f, "file_to_app"),
            SyncDirection::AppToFile => write!(f, "app_to_file"),
            SyncDirection::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

impl std::str::FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "file_to_app" => Ok(SyncDirection::FileToApp),
            "app_to_file" => Ok(SyncDirection::AppToFile),
            "bidirectional" => Ok(SyncDirection::Bidirectional),
            _ => Err(format!("Unknown sync direction: {}", s)),
        }
    }
}

/// Which conflict resolver a file→database pass runs matched tasks through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStrategy {
    /// The file is authoritative
    #[default]
    FileWins,
    /// The database is authoritative; the file only contributes new tasks
    DbWins,
    /// Field-level three-way merge against the last synced snapshot
    Merge,
}

/// How the merge strategy settles a field changed on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    #[default]
    PreferFile,
    PreferDb,
    /// Keep the database value and report the conflict as unresolved
    Manual,
}

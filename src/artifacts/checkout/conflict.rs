//! Checkout conflict types and messages
//!
//! This module defines the types of conflicts that can occur while updating
//! the working tree and provides user-facing messages for each type.
//!
//! ## Conflict Types
//!
//! - Stale File: working directory file differs from every side of the
//!   update and would be overwritten
//! - Stale Directory: directory with tracked content in the way of a file
//! - Untracked Overwritten: untracked file would be overwritten
//! - Untracked Removed: untracked file would be removed

use crate::artifacts::core::error::EngineError;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// User-facing conflict message
///
/// Header and footer text displayed around the list of conflicting files.
#[derive(Debug)]
pub struct ConflictMessage {
    pub header: &'static str,
    pub footer: &'static str,
}

impl From<&ConflictType> for ConflictMessage {
    fn from(value: &ConflictType) -> Self {
        match value {
            ConflictType::StaleFile => Self {
                header: "Your local changes to the following files would be overwritten by checkout:",
                footer: "Please commit your changes or stash them before you switch branches.",
            },
            ConflictType::StaleDirectory => Self {
                header: "Updating the following directories would lose untracked files in them:",
                footer: "\n",
            },
            ConflictType::UntrackedOverwritten => Self {
                header: "The following untracked working tree files would be overwritten by checkout:",
                footer: "Please move or remove them before you switch branches.",
            },
            ConflictType::UntrackedRemoved => Self {
                header: "The following untracked working tree files would be removed by checkout:",
                footer: "Please move or remove them before you switch branches.",
            },
        }
    }
}

/// Type of checkout conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictType {
    /// Local modifications to tracked files would be lost
    StaleFile,
    /// Directory with tracked content exists where a file should go
    StaleDirectory,
    /// Untracked file would be overwritten
    UntrackedOverwritten,
    /// Untracked file would be removed
    UntrackedRemoved,
}

/// Set of detected conflicts grouped by type
pub type ConflictsSet = BTreeMap<ConflictType, Vec<PathBuf>>;

/// Render collected conflicts into one error, keyed on the first path
///
/// The error kind carries the first offending path; the message lists every
/// path grouped under its header and footer.
pub fn conflicts_error(conflicts: &ConflictsSet) -> Option<anyhow::Error> {
    let mut blocks = Vec::new();
    let mut first: Option<(ConflictType, PathBuf)> = None;

    for (conflict_type, paths) in conflicts {
        if paths.is_empty() {
            continue;
        }
        if first.is_none() {
            first = Some((*conflict_type, paths[0].clone()));
        }

        let listed = paths
            .iter()
            .map(|path| format!("\t{}", path.display()))
            .collect::<Vec<_>>()
            .join("\n");
        let ConflictMessage { header, footer } = conflict_type.into();
        blocks.push(format!("{}\n{}\n{}", header, listed, footer));
    }

    let (conflict_type, path) = first?;
    let kind = match conflict_type {
        ConflictType::StaleFile | ConflictType::StaleDirectory => {
            EngineError::WorkdirDirty(path)
        }
        ConflictType::UntrackedOverwritten | ConflictType::UntrackedRemoved => {
            EngineError::UntrackedOverwrite(path)
        }
    };

    Some(anyhow::Error::new(kind).context(format!("\n{}\n\nAborting", blocks.join("\n\n"))))
}

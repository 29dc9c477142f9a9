//! Engine error taxonomy
//!
//! Errors are raised as `EngineError` values wrapped in `anyhow` so that call
//! sites can freely attach context while the command layer still recovers the
//! kind via downcasting. The taxonomy distinguishes kinds, not call sites:
//! a missing loose object and a missing ref both surface as `NotFound`.

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds surfaced by the engine
///
/// Local recovery is limited to ref-lock retries and short-digest
/// disambiguation; everything else propagates verbatim to the command layer,
/// which translates the kind into an exit code and a single diagnostic line.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Object, ref, or path absent
    #[error("{0} not found")]
    NotFound(String),

    /// Structural failure: bad header, trailer mismatch, bad zlib stream
    #[error("corrupt repository data: {0}")]
    Corrupt(String),

    /// Short digest or name matched more than one candidate
    #[error("{0}")]
    AmbiguousRef(String),

    /// Revision specifier failed to parse
    #[error("bad revision '{0}'")]
    BadRevision(String),

    /// Symbolic reference chain exceeded the dereference limit
    #[error("reference loop while resolving '{0}'")]
    RefLoop(String),

    /// Compare-and-swap reference update observed an unexpected old value
    #[error("reference '{0}' changed concurrently")]
    RefConflict(String),

    /// Working tree file has local modifications that a checkout would lose
    #[error("local changes to '{}' would be overwritten", .0.display())]
    WorkdirDirty(PathBuf),

    /// Three-way tree merge produced conflicting stages
    #[error("merge conflict in '{}'", .0.display())]
    MergeConflict(PathBuf),

    /// Checkout would clobber an untracked working tree file
    #[error("untracked working tree file '{}' would be overwritten", .0.display())]
    UntrackedOverwrite(PathBuf),

    /// Patch context did not match the target content
    #[error("patch failed: {} hunk #{}", .file.display(), .hunk)]
    PatchApplyFailed { file: PathBuf, hunk: usize },

    /// Lock acquisition exceeded its deadline
    #[error("timed out waiting for lock on '{}'", .0.display())]
    LockTimeout(PathBuf),

    /// An external collaborator cancelled the operation; not a failure
    #[error("operation aborted")]
    UserAborted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True when the error represents a deliberate abort rather than a failure
    pub fn is_user_abort(&self) -> bool {
        matches!(self, EngineError::UserAborted)
    }
}

/// Extract the engine error kind from an `anyhow` chain, if present
pub fn engine_error(err: &anyhow::Error) -> Option<&EngineError> {
    err.downcast_ref::<EngineError>()
}

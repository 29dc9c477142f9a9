//! Cooperative cancellation
//!
//! Long-running walks (tree traversal, pack delta resolution, rename
//! detection) consult a token between records. Cancellation is cooperative:
//! nothing is interrupted mid-write, and a cancelled operation surfaces
//! `EngineError::UserAborted`.

use crate::artifacts::core::error::EngineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared cancellation flag
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at the next checkpoint
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Checkpoint: fail with `UserAborted` once cancellation was requested
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            return Err(EngineError::UserAborted.into());
        }
        Ok(())
    }
}

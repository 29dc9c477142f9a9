//! Advisory lock files
//!
//! Mutations of shared repository files (index, refs, packed-refs) go through
//! a `<target>.lock` file: the lock is created exclusively, the new content is
//! written into it, and `commit` renames it over the target so readers only
//! ever observe complete files. Dropping an uncommitted lock removes it.
//!
//! Lock acquisition is advisory but mandatory: a second writer spins with
//! bounded backoff until the configured deadline and then fails with
//! `LockTimeout`.

use crate::artifacts::core::error::EngineError;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default deadline for lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay between acquisition attempts
const RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive lock on a repository file
///
/// Holds `<target>.lock` from acquisition until `commit` (rename over the
/// target) or drop (removal). Content written through the lock is only
/// published by `commit`.
#[derive(Debug)]
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl LockFile {
    /// Acquire the lock for `target`, retrying up to the default deadline
    pub fn acquire(target: &Path) -> anyhow::Result<Self> {
        Self::acquire_with_timeout(target, DEFAULT_LOCK_TIMEOUT)
    }

    /// Acquire the lock for `target`, retrying up to `timeout`
    pub fn acquire_with_timeout(target: &Path, timeout: Duration) -> anyhow::Result<Self> {
        let lock_path = Self::lock_path_for(target);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directories for {:?}", lock_path)
            })?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(file) => {
                    return Ok(LockFile {
                        target: target.to_path_buf(),
                        lock_path,
                        file: Some(file),
                        committed: false,
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(EngineError::LockTimeout(target.to_path_buf()).into());
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create lock file {:?}", lock_path));
                }
            }
        }
    }

    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        target.with_file_name(name)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Write content into the lock file (not yet visible to readers)
    pub fn write_all(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("lock file already committed"))?
            .write_all(data)
            .with_context(|| format!("failed to write lock file {:?}", self.lock_path))?;

        Ok(())
    }

    /// Publish the written content by renaming the lock over the target
    pub fn commit(mut self) -> anyhow::Result<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| anyhow::anyhow!("lock file already committed"))?;
        file.sync_all()
            .with_context(|| format!("failed to sync lock file {:?}", self.lock_path))?;
        drop(file);

        std::fs::rename(&self.lock_path, &self.target)
            .with_context(|| format!("failed to rename lock file over {:?}", self.target))?;
        self.committed = true;

        Ok(())
    }

    /// Discard the lock without publishing anything
    pub fn rollback(mut self) -> anyhow::Result<()> {
        self.file.take();
        self.committed = true;
        std::fs::remove_file(&self.lock_path)
            .with_context(|| format!("failed to remove lock file {:?}", self.lock_path))?;

        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

//! Scoped temp-file guard for generated patches
//!
//! The interactive-checkout path writes a recombined patch to a temp file
//! before applying it in reverse. The guard owns that file: it can be kept
//! (renamed to a final location) or is removed on drop, including on error
//! and cancellation paths.

use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Temp file removed on drop unless explicitly kept
#[derive(Debug)]
pub struct TempPatch {
    path: PathBuf,
    finalized: bool,
}

impl TempPatch {
    /// Create an empty temp patch file inside `dir`
    pub fn create_in(dir: &Path) -> anyhow::Result<Self> {
        let name = format!(
            "patch-{}-{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = dir.join(name);

        std::fs::File::create(&path)
            .with_context(|| format!("failed to create temp patch {:?}", path))?;

        Ok(TempPatch {
            path,
            finalized: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_all(&mut self, data: &[u8]) -> anyhow::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open temp patch {:?}", self.path))?;
        file.write_all(data)
            .with_context(|| format!("failed to write temp patch {:?}", self.path))?;

        Ok(())
    }

    pub fn read_to_string(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read temp patch {:?}", self.path))
    }

    /// Keep the file by renaming it to a final location
    pub fn keep_at(mut self, target: &Path) -> anyhow::Result<()> {
        std::fs::rename(&self.path, target)
            .with_context(|| format!("failed to rename temp patch to {:?}", target))?;
        self.finalized = true;

        Ok(())
    }
}

impl Drop for TempPatch {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_patch_is_removed() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path;
        {
            let mut patch = TempPatch::create_in(dir.path()).unwrap();
            patch.write_all(b"diff --git a/x b/x\n").unwrap();
            path = patch.path().to_path_buf();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_kept_patch_survives_at_target() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("final.patch");

        let mut patch = TempPatch::create_in(dir.path()).unwrap();
        patch.write_all(b"content").unwrap();
        patch.keep_at(&target).unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"content");
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let mut patch = TempPatch::create_in(dir.path()).unwrap();
        patch.write_all(b"first\n").unwrap();
        patch.write_all(b"second\n").unwrap();

        assert_eq!(patch.read_to_string().unwrap(), "first\nsecond\n");
    }
}

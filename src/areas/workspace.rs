//! Working directory operations
//!
//! The workspace wraps file system access under the repository root: listing
//! candidate files, reading and hashing content, and applying planned
//! checkout mutations. The repository's own metadata directory is never
//! surfaced.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 3] = [".git", ".", ".."];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a file into a blob, following the entry-mode rules
    ///
    /// Symbolic links become blobs holding their target path.
    pub fn parse_blob(&self, path: &Path) -> anyhow::Result<Blob> {
        Ok(Blob::from_bytes(self.read_file_bytes(path)?))
    }

    pub fn read_file_bytes(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let full_path = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&full_path)
            .with_context(|| format!("failed to stat {:?}", file_path))?;

        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&full_path)
                .with_context(|| format!("failed to read link {:?}", file_path))?;
            return Ok(Bytes::from(target.to_string_lossy().into_owned()));
        }

        let content = std::fs::read(&full_path)
            .with_context(|| format!("failed to read {:?}", file_path))?;
        Ok(Bytes::from(content))
    }

    /// List all files under a path (or the whole workspace), repo-relative
    pub fn list_files(&self, root_file_path: Option<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
        let root_file_path = match root_file_path {
            Some(p) => {
                let full = if p.is_absolute() { p } else { self.path.join(p) };
                std::fs::canonicalize(&full)
                    .with_context(|| format!("pathspec {:?} did not match any files", full))?
            }
            None => self.path.clone().into(),
        };

        if root_file_path.is_dir() {
            let mut files = WalkDir::new(&root_file_path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| self.check_if_not_ignored_file_path(entry.path()))
                .collect::<Vec<_>>();
            files.sort();
            Ok(files)
        } else {
            Ok(vec![
                root_file_path
                    .strip_prefix(self.path.as_ref())
                    .map(PathBuf::from)
                    .unwrap_or_default(),
            ])
        }
    }

    fn is_ignored(path: &Path) -> bool {
        path.components().any(|component| {
            if let std::path::Component::Normal(name) = component {
                let name_str = name.to_string_lossy();
                IGNORED_PATHS.contains(&name_str.as_ref())
            } else {
                false
            }
        })
    }

    fn check_if_not_ignored_file_path(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() && !Self::is_ignored(path) {
            Some(path.strip_prefix(self.path.as_ref()).ok()?.to_path_buf())
        } else {
            None
        }
    }

    /// Stat a path without following symlinks
    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<EntryMetadata> {
        let full_path = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&full_path)?;

        (full_path.as_path(), metadata).try_into()
    }

    pub fn exists(&self, file_path: &Path) -> bool {
        self.path.join(file_path).symlink_metadata().is_ok()
    }

    /// Write file content with the mode an entry prescribes
    pub fn write_file(&self, file_path: &Path, data: &[u8], entry: &DatabaseEntry) -> anyhow::Result<()> {
        let full_path = self.path.join(file_path);

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directories for {:?}", file_path))?;
        }

        // clear whatever occupies the path first
        if let Ok(metadata) = std::fs::symlink_metadata(&full_path) {
            if metadata.is_dir() {
                std::fs::remove_dir_all(&full_path)
                    .with_context(|| format!("failed to remove directory {:?}", file_path))?;
            } else {
                std::fs::remove_file(&full_path)
                    .with_context(|| format!("failed to remove file {:?}", file_path))?;
            }
        }

        if entry.mode == EntryMode::Symlink {
            #[cfg(unix)]
            std::os::unix::fs::symlink(
                Path::new(std::str::from_utf8(data).unwrap_or_default()),
                &full_path,
            )
            .with_context(|| format!("failed to create symlink {:?}", file_path))?;
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .with_context(|| format!("failed to open file {:?}", file_path))?;
        file.write_all(data)
            .with_context(|| format!("failed to write file {:?}", file_path))?;
        drop(file);

        self.set_mode(file_path, entry)
    }

    /// Apply an entry's mode bits to an existing file
    pub fn set_mode(&self, file_path: &Path, entry: &DatabaseEntry) -> anyhow::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let bits = match entry.mode {
                EntryMode::File(crate::artifacts::index::entry_mode::FileMode::Executable) => 0o755,
                _ => 0o644,
            };
            std::fs::set_permissions(
                self.path.join(file_path),
                std::fs::Permissions::from_mode(bits),
            )
            .with_context(|| format!("failed to set permissions for {:?}", file_path))?;
        }

        Ok(())
    }

    pub fn remove_file(&self, file_path: &Path) -> anyhow::Result<()> {
        let full_path = self.path.join(file_path);

        match std::fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove file {:?}", file_path))
            }
        }
    }

    /// Remove now-empty parent directories of a deleted file, bottom-up
    pub fn prune_empty_parents(&self, file_path: &Path) -> anyhow::Result<()> {
        let mut parent = file_path.parent();

        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() {
                break;
            }
            let full_dir = self.path.join(dir);
            match std::fs::remove_dir(&full_dir) {
                Ok(()) => {}
                // stop at the first non-empty or missing directory
                Err(_) => break,
            }
            parent = dir.parent();
        }

        Ok(())
    }

    /// True when any file exists under the given directory
    pub fn has_files_under(&self, dir_path: &Path) -> bool {
        let full_path = self.path.join(dir_path);

        WalkDir::new(&full_path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.path().is_file() && !Self::is_ignored(entry.path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::objects::object_id::DigestKind;
    use pretty_assertions::assert_eq;

    fn workspace(dir: &assert_fs::TempDir) -> Workspace {
        Workspace::new(dir.path().to_path_buf().into_boxed_path())
    }

    #[test]
    fn test_list_files_skips_repository_dir() {
        let dir = assert_fs::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(dir.path().join("tracked.txt"), "data").unwrap();

        let files = workspace(&dir).list_files(None).unwrap();
        assert_eq!(files, vec![PathBuf::from("tracked.txt")]);
    }

    #[test]
    fn test_write_file_replaces_directory() {
        let dir = assert_fs::TempDir::new().unwrap();
        let ws = workspace(&dir);
        std::fs::create_dir_all(dir.path().join("thing")).unwrap();

        let entry = DatabaseEntry::new(
            DigestKind::Sha1.hash(b"content"),
            EntryMode::File(FileMode::Regular),
        );
        ws.write_file(Path::new("thing"), b"content", &entry).unwrap();

        assert_eq!(std::fs::read(dir.path().join("thing")).unwrap(), b"content");
    }

    #[test]
    fn test_prune_empty_parents_stops_at_occupied_dir() {
        let dir = assert_fs::TempDir::new().unwrap();
        let ws = workspace(&dir);
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/keep.txt"), "keep").unwrap();

        ws.prune_empty_parents(Path::new("a/b/c/gone.txt")).unwrap();

        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a").exists());
    }
}

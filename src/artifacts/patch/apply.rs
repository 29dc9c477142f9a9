//! Patch application
//!
//! Applies a parsed patch to the working tree or, in cached mode, to the
//! index. Context is matched exactly (zero fuzz); the first mismatch fails
//! with `PatchApplyFailed` naming the file and hunk index, and nothing is
//! written for that run.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::core::error::EngineError;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::patch::parse::{FileChangeKind, FilePatch, Patch, PatchLineKind};
use anyhow::Context;
use bytes::Bytes;

/// Application behavior, explicitly enumerated
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Undo the patch instead of applying it
    pub reverse: bool,
    /// Operate on the index instead of the working tree
    pub cached: bool,
}

/// Result of applying one file section in memory
#[derive(Debug)]
struct AppliedFile {
    content: Bytes,
    mode: EntryMode,
    delete: bool,
}

/// Patch applier bound to a repository
pub struct PatchApplier<'r> {
    repository: &'r Repository,
    options: ApplyOptions,
    cancel: CancelToken,
}

impl<'r> PatchApplier<'r> {
    pub fn new(repository: &'r Repository, options: ApplyOptions, cancel: CancelToken) -> Self {
        PatchApplier {
            repository,
            options,
            cancel,
        }
    }

    /// Apply every file section of the patch
    ///
    /// All sections are transformed in memory first; writes only start once
    /// the whole patch applied cleanly.
    pub fn apply(&self, index: &mut Index, patch: &Patch) -> anyhow::Result<()> {
        let oriented;
        let patch = if self.options.reverse {
            oriented = patch.reversed();
            &oriented
        } else {
            patch
        };

        let mut applied = Vec::with_capacity(patch.files.len());
        for file in &patch.files {
            self.cancel.check()?;
            applied.push((file, self.apply_file(index, file)?));
        }

        for (file, result) in applied {
            self.write_result(index, file, result)?;
        }
        index.write_updates()?;

        Ok(())
    }

    /// Transform one file section in memory
    fn apply_file(&self, index: &Index, file: &FilePatch) -> anyhow::Result<AppliedFile> {
        let path = file.target_path();

        let (source, source_newline) = match file.kind {
            FileChangeKind::Create => (Vec::new(), true),
            _ => self.load_source(index, file)?,
        };

        let mut result: Vec<String> = Vec::new();
        let mut result_newline = true;
        let mut cursor = 0usize;

        for (hunk_index, hunk) in file.hunks.iter().enumerate() {
            self.cancel.check()?;

            let fail = || EngineError::PatchApplyFailed {
                file: path.clone(),
                hunk: hunk_index,
            };

            // a zero-count old side anchors after the stated line
            let start = if hunk.old_count == 0 {
                hunk.old_start
            } else {
                hunk.old_start.saturating_sub(1)
            };
            if start < cursor || start > source.len() {
                return Err(fail().into());
            }

            result.extend(source[cursor..start].iter().cloned());
            cursor = start;

            for line in &hunk.lines {
                match line.kind {
                    PatchLineKind::Context | PatchLineKind::Del => {
                        if source.get(cursor).map(|s| s.as_str()) != Some(line.text.as_str()) {
                            return Err(fail().into());
                        }
                        if line.kind == PatchLineKind::Context {
                            result.push(line.text.clone());
                            result_newline = !line.no_newline;
                        }
                        cursor += 1;
                    }
                    PatchLineKind::Add => {
                        result.push(line.text.clone());
                        result_newline = !line.no_newline;
                    }
                }
            }
        }

        let tail_remains = cursor < source.len();
        result.extend(source[cursor..].iter().cloned());
        if tail_remains {
            result_newline = source_newline;
        }

        let delete = matches!(file.kind, FileChangeKind::Delete) && result.is_empty();
        let mode = file
            .new_mode
            .or(file.old_mode)
            .unwrap_or(EntryMode::File(FileMode::Regular));

        let mut content = result.join("\n");
        if !content.is_empty() && result_newline {
            content.push('\n');
        }

        Ok(AppliedFile {
            content: Bytes::from(content),
            mode,
            delete,
        })
    }

    /// Load the pre-image lines from the index or working tree
    fn load_source(
        &self,
        index: &Index,
        file: &FilePatch,
    ) -> anyhow::Result<(Vec<String>, bool)> {
        // by the time we get here the patch is oriented forward, so the old
        // side always names the on-disk pre-image
        let path = &file.old_path;

        let content = if self.options.cached {
            let entry = index.entry_by_path(path).ok_or_else(|| {
                EngineError::NotFound(format!("path '{}' in the index", path.display()))
            })?;
            let blob = self
                .repository
                .database()
                .parse_object_as_blob(&entry.oid)?
                .with_context(|| format!("failed to load blob {}", entry.oid))?;
            blob.content().clone()
        } else {
            self.repository.workspace().read_file_bytes(path)?
        };

        let ends_with_newline = content.is_empty() || content.last() == Some(&b'\n');
        let text = String::from_utf8_lossy(&content);
        let mut lines: Vec<String> = text.split('\n').map(|line| line.to_string()).collect();
        if ends_with_newline && !content.is_empty() {
            lines.pop();
        }

        Ok((lines, ends_with_newline))
    }

    /// Publish one transformed file to the selected destination
    fn write_result(
        &self,
        index: &mut Index,
        file: &FilePatch,
        applied: AppliedFile,
    ) -> anyhow::Result<()> {
        let path = file.target_path();

        if applied.delete {
            if self.options.cached {
                index.remove(path.clone())?;
            } else {
                self.repository.workspace().remove_file(path)?;
                self.repository.workspace().prune_empty_parents(path)?;
            }
            return Ok(());
        }

        if self.options.cached {
            let blob = Blob::from_bytes(applied.content);
            let oid = self.repository.database().store(&blob)?;
            index.add(IndexEntry::from_parts(
                path.clone(),
                oid,
                EntryMetadata {
                    mode: applied.mode,
                    ..Default::default()
                },
            ))?;
        } else {
            // plain application never touches the index
            let blob = Blob::from_bytes(applied.content.clone());
            let entry = DatabaseEntry::new(
                blob.object_id(self.repository.database().kind())?,
                applied.mode,
            );
            self.repository
                .workspace()
                .write_file(path, &applied.content, &entry)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::diff::diff_target::DiffTarget;
    use crate::artifacts::objects::object::Packable;
    use crate::artifacts::diff::unified::{PatchFormat, write_patch};
    use crate::artifacts::objects::object_id::DigestKind;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const CONTENT_A: &str = "one\ntwo\nthree\nfour\n";
    const CONTENT_B: &str = "one\nTWO\nthree\nfour\nfive\n";

    fn repository(dir: &assert_fs::TempDir) -> Repository {
        let repository =
            Repository::new(dir.path().to_path_buf(), Box::new(std::io::sink())).unwrap();
        std::fs::create_dir_all(repository.git_path().join("objects")).unwrap();
        repository
    }

    fn target(path: &str, content: &str) -> DiffTarget {
        let blob = Blob::from_bytes(content.as_bytes().to_vec());
        let framed = blob.serialize().unwrap();
        DiffTarget {
            path: PathBuf::from(path),
            oid: DigestKind::Sha1.hash(&framed),
            mode: Some(EntryMode::File(FileMode::Regular)),
            data: blob.content().clone(),
        }
    }

    fn patch_between(a: &str, b: &str) -> Patch {
        let mut text = Vec::new();
        write_patch(
            &mut text,
            &target("file.txt", a),
            &target("file.txt", b),
            &PatchFormat::default(),
        )
        .unwrap();
        Patch::parse(std::str::from_utf8(&text).unwrap()).unwrap()
    }

    #[test]
    fn test_forward_apply_transforms_a_into_b() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repository = repository(&dir);
        std::fs::write(dir.path().join("file.txt"), CONTENT_A).unwrap();

        let patch = patch_between(CONTENT_A, CONTENT_B);
        let mut index = Index::new(
            repository.git_path().join("index").into_boxed_path(),
            DigestKind::Sha1,
            2,
        );

        let applier =
            PatchApplier::new(&repository, ApplyOptions::default(), CancelToken::new());
        applier.apply(&mut index, &patch).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("file.txt")).unwrap(),
            CONTENT_B
        );
    }

    #[test]
    fn test_reverse_apply_transforms_b_back_into_a() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repository = repository(&dir);
        std::fs::write(dir.path().join("file.txt"), CONTENT_B).unwrap();

        let patch = patch_between(CONTENT_A, CONTENT_B);
        let mut index = Index::new(
            repository.git_path().join("index").into_boxed_path(),
            DigestKind::Sha1,
            2,
        );

        let options = ApplyOptions {
            reverse: true,
            cached: false,
        };
        let applier = PatchApplier::new(&repository, options, CancelToken::new());
        applier.apply(&mut index, &patch).unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("file.txt")).unwrap(),
            CONTENT_A
        );
    }

    #[test]
    fn test_mismatched_context_fails_naming_file_and_hunk() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repository = repository(&dir);
        std::fs::write(dir.path().join("file.txt"), "entirely different\n").unwrap();

        let patch = patch_between(CONTENT_A, CONTENT_B);
        let mut index = Index::new(
            repository.git_path().join("index").into_boxed_path(),
            DigestKind::Sha1,
            2,
        );

        let applier =
            PatchApplier::new(&repository, ApplyOptions::default(), CancelToken::new());
        let err = applier.apply(&mut index, &patch).unwrap_err();

        match crate::artifacts::core::error::engine_error(&err) {
            Some(EngineError::PatchApplyFailed { file, hunk }) => {
                assert_eq!(file, &PathBuf::from("file.txt"));
                assert_eq!(*hunk, 0);
            }
            other => panic!("expected PatchApplyFailed, got {:?}", other),
        }

        // the mismatch left the file untouched
        assert_eq!(
            std::fs::read_to_string(dir.path().join("file.txt")).unwrap(),
            "entirely different\n"
        );
    }

    #[test]
    fn test_cached_apply_updates_index_blob() {
        let dir = assert_fs::TempDir::new().unwrap();
        let repository = repository(&dir);

        let mut index = Index::new(
            repository.git_path().join("index").into_boxed_path(),
            DigestKind::Sha1,
            2,
        );
        let blob = Blob::from_bytes(CONTENT_A.as_bytes().to_vec());
        let oid = repository.database().store(&blob).unwrap();
        index
            .add(IndexEntry::from_parts(
                PathBuf::from("file.txt"),
                oid,
                EntryMetadata {
                    mode: EntryMode::File(FileMode::Regular),
                    ..Default::default()
                },
            ))
            .unwrap();

        let patch = patch_between(CONTENT_A, CONTENT_B);
        let options = ApplyOptions {
            reverse: false,
            cached: true,
        };
        let applier = PatchApplier::new(&repository, options, CancelToken::new());
        applier.apply(&mut index, &patch).unwrap();

        let entry = index.entry_by_path(std::path::Path::new("file.txt")).unwrap();
        let staged = repository
            .database()
            .parse_object_as_blob(&entry.oid)
            .unwrap()
            .unwrap();
        assert_eq!(staged.content().as_ref(), CONTENT_B.as_bytes());
    }
}

//! One side of a content diff
//!
//! A `DiffTarget` names a file state: path, digest, mode, and content bytes.
//! Targets are built from any of the three sources (tree, index, worktree)
//! and an absent side (`from_nothing`) carries the null digest and no mode.

use crate::areas::database::Database;
use crate::areas::workspace::Workspace;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use anyhow::Context;
use bytes::Bytes;
use std::path::{Path, PathBuf};

const NULL_PATH: &str = "/dev/null";

/// How many leading bytes are sniffed for binary content
const BINARY_SNIFF_LEN: usize = 8000;

#[derive(Debug, Clone)]
pub struct DiffTarget {
    pub path: PathBuf,
    pub oid: ObjectId,
    pub mode: Option<EntryMode>,
    pub data: Bytes,
}

impl DiffTarget {
    /// Target backed by a blob in the object database
    pub fn from_blob(
        path: &Path,
        oid: &ObjectId,
        mode: EntryMode,
        database: &Database,
    ) -> anyhow::Result<Self> {
        let blob = database
            .parse_object_as_blob(oid)?
            .with_context(|| format!("object {} is not a blob", oid))?;

        Ok(Self {
            path: path.to_path_buf(),
            oid: oid.clone(),
            mode: Some(mode),
            data: blob.content().clone(),
        })
    }

    /// Target backed by the working tree copy of a file
    pub fn from_worktree(
        path: &Path,
        workspace: &Workspace,
        kind: DigestKind,
    ) -> anyhow::Result<Self> {
        let blob = workspace.parse_blob(path)?;
        let oid = blob.object_id(kind)?;
        let mode = workspace.stat_file(path)?.mode;

        Ok(Self {
            path: path.to_path_buf(),
            oid,
            mode: Some(mode),
            data: blob.content().clone(),
        })
    }

    /// The absent side of an addition or deletion
    pub fn from_nothing(path: &Path, kind: DigestKind) -> Self {
        Self {
            path: path.to_path_buf(),
            oid: kind.null_oid(),
            mode: None,
            data: Bytes::new(),
        }
    }

    pub fn exists(&self) -> bool {
        self.mode.is_some()
    }

    /// Path label for patch headers (`a/<path>` or `/dev/null`)
    pub fn diff_path(&self, prefix: &str) -> String {
        if self.mode.is_some() {
            format!("{}/{}", prefix, self.path.display())
        } else {
            NULL_PATH.to_string()
        }
    }

    pub fn pretty_mode(&self) -> &str {
        self.mode
            .as_ref()
            .map(|mode| mode.as_padded_str())
            .unwrap_or("100644")
    }

    /// Binary sniff: a NUL in the first 8000 bytes marks the side binary
    pub fn is_binary(&self) -> bool {
        self.data
            .iter()
            .take(BINARY_SNIFF_LEN)
            .any(|&byte| byte == 0)
    }

    /// Content as lines without terminators
    pub fn lines(&self) -> Vec<String> {
        if self.data.is_empty() {
            return Vec::new();
        }

        let text = String::from_utf8_lossy(&self.data);
        let mut lines: Vec<String> = text.split('\n').map(|line| line.to_string()).collect();
        if self.ends_with_newline() {
            // drop the empty element after the final terminator, nothing else
            lines.pop();
        }

        lines
    }

    /// True when the content ends with a newline (empty counts as true)
    pub fn ends_with_newline(&self) -> bool {
        self.data.is_empty() || self.data.last() == Some(&b'\n')
    }
}

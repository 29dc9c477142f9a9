//! Entry-set diffing
//!
//! Flattens any of {tree, index, worktree} into a sorted map of
//! path → (mode, digest) and compares two such maps into a sequence of
//! `HashDiff` records. Content never has to be read for the pairing step;
//! rename detection loads content lazily for unmatched adds and deletes.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::rename;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sorted path → entry map, one side of a comparison
pub type EntrySet = BTreeMap<PathBuf, DatabaseEntry>;

/// Status of one changed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffStatus {
    Added,
    Deleted,
    Modified,
    /// File type changed (regular file vs symlink vs gitlink)
    TypeChanged,
    /// Detected rename; similarity score in percent
    Renamed { from: PathBuf, score: u8 },
    /// Exact copy whose source survives unchanged
    Copied { from: PathBuf },
}

impl DiffStatus {
    /// Status letter (with score for renames/copies) as in raw output
    pub fn code(&self) -> String {
        match self {
            DiffStatus::Added => "A".to_string(),
            DiffStatus::Deleted => "D".to_string(),
            DiffStatus::Modified => "M".to_string(),
            DiffStatus::TypeChanged => "T".to_string(),
            DiffStatus::Renamed { score, .. } => format!("R{:03}", score),
            DiffStatus::Copied { .. } => "C100".to_string(),
        }
    }
}

/// One changed path between two entry sets
#[derive(Debug, Clone)]
pub struct HashDiff {
    pub path: PathBuf,
    pub old_mode: Option<EntryMode>,
    pub new_mode: Option<EntryMode>,
    pub old_oid: Option<ObjectId>,
    pub new_oid: Option<ObjectId>,
    pub status: DiffStatus,
}

impl HashDiff {
    /// Raw format line: `:<mode1> <mode2> <oid1> <oid2> <status>\t<path>`
    ///
    /// Renames and copies carry both paths, source first.
    pub fn raw_line(&self, kind: DigestKind) -> String {
        let null = kind.null_oid();
        let old_mode = self
            .old_mode
            .map(|mode| mode.as_padded_str().to_string())
            .unwrap_or_else(|| "000000".to_string());
        let new_mode = self
            .new_mode
            .map(|mode| mode.as_padded_str().to_string())
            .unwrap_or_else(|| "000000".to_string());
        let old_oid = self.old_oid.as_ref().unwrap_or(&null);
        let new_oid = self.new_oid.as_ref().unwrap_or(&null);

        match &self.status {
            DiffStatus::Renamed { from, .. } | DiffStatus::Copied { from } => format!(
                ":{} {} {} {} {}\t{}\t{}",
                old_mode,
                new_mode,
                old_oid,
                new_oid,
                self.status.code(),
                from.display(),
                self.path.display()
            ),
            _ => format!(
                ":{} {} {} {} {}\t{}",
                old_mode,
                new_mode,
                old_oid,
                new_oid,
                self.status.code(),
                self.path.display()
            ),
        }
    }

    /// The same diff observed from the other direction
    pub fn reversed(&self) -> HashDiff {
        let status = match &self.status {
            DiffStatus::Added => DiffStatus::Deleted,
            DiffStatus::Deleted => DiffStatus::Added,
            other => other.clone(),
        };

        HashDiff {
            path: self.path.clone(),
            old_mode: self.new_mode,
            new_mode: self.old_mode,
            old_oid: self.new_oid.clone(),
            new_oid: self.old_oid.clone(),
            status,
        }
    }
}

/// Comparison behavior, explicitly enumerated
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Run rename detection over unmatched adds and deletes
    pub detect_renames: bool,
    /// Minimum similarity (percent) for a rename pair
    pub rename_threshold: u8,
    /// Restrict the comparison to these path prefixes (empty = all)
    pub paths: Vec<PathBuf>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            detect_renames: true,
            rename_threshold: rename::DEFAULT_THRESHOLD,
            paths: Vec::new(),
        }
    }
}

impl DiffOptions {
    fn matches(&self, path: &Path) -> bool {
        self.paths.is_empty()
            || self
                .paths
                .iter()
                .any(|prefix| path.starts_with(prefix) || path == prefix)
    }
}

/// Loads one side's content for rename scoring
pub type ContentLoader<'l> = &'l dyn Fn(&Path, &ObjectId) -> anyhow::Result<Bytes>;

/// Flatten a tree (or nothing) into an entry set
pub fn tree_entry_set(
    database: &Database,
    tree_oid: Option<&ObjectId>,
) -> anyhow::Result<EntrySet> {
    let mut set = EntrySet::new();
    if let Some(oid) = tree_oid {
        collect_tree(database, oid, Path::new(""), &mut set)?;
    }
    Ok(set)
}

fn collect_tree(
    database: &Database,
    tree_oid: &ObjectId,
    prefix: &Path,
    set: &mut EntrySet,
) -> anyhow::Result<()> {
    let tree = database
        .parse_object_as_tree(tree_oid)?
        .ok_or_else(|| anyhow::anyhow!("object {} is not a tree", tree_oid))?;

    for (name, entry) in tree.entries() {
        let path = prefix.join(name);
        if entry.is_tree() {
            collect_tree(database, &entry.oid, &path, set)?;
        } else {
            set.insert(path, entry.clone());
        }
    }

    Ok(())
}

/// Flatten the index's merged entries into an entry set
pub fn index_entry_set(index: &Index) -> EntrySet {
    index
        .merged_entries()
        .map(|entry| {
            (
                entry.name.clone(),
                DatabaseEntry::new(entry.oid.clone(), entry.metadata.mode),
            )
        })
        .collect()
}

/// Snapshot the working tree state of every tracked path
///
/// Tracked files are re-hashed from disk; missing files are simply absent
/// from the set (they show as deletions against the index).
pub fn worktree_entry_set(
    workspace: &Workspace,
    index: &Index,
    kind: DigestKind,
) -> anyhow::Result<EntrySet> {
    let mut set = EntrySet::new();

    for entry in index.merged_entries() {
        if !workspace.exists(&entry.name) {
            continue;
        }

        let stat = workspace.stat_file(&entry.name)?;
        let blob = workspace.parse_blob(&entry.name)?;
        let oid = blob.object_id(kind)?;
        set.insert(entry.name.clone(), DatabaseEntry::new(oid, stat.mode));
    }

    Ok(set)
}

/// Compare two entry sets into a sorted sequence of `HashDiff` records
///
/// The cancel token is consulted per path. Content loaders are only invoked
/// when rename detection needs to score candidates.
pub fn compare_entry_sets(
    old: &EntrySet,
    new: &EntrySet,
    options: &DiffOptions,
    old_content: ContentLoader,
    new_content: ContentLoader,
    cancel: &CancelToken,
) -> anyhow::Result<Vec<HashDiff>> {
    let mut diffs = Vec::new();

    let paths: std::collections::BTreeSet<&PathBuf> = old.keys().chain(new.keys()).collect();
    for path in paths {
        cancel.check()?;

        if !options.matches(path) {
            continue;
        }

        let old_entry = old.get(path);
        let new_entry = new.get(path);

        let diff = match (old_entry, new_entry) {
            (None, Some(added)) => HashDiff {
                path: path.clone(),
                old_mode: None,
                new_mode: Some(added.mode),
                old_oid: None,
                new_oid: Some(added.oid.clone()),
                status: DiffStatus::Added,
            },
            (Some(deleted), None) => HashDiff {
                path: path.clone(),
                old_mode: Some(deleted.mode),
                new_mode: None,
                old_oid: Some(deleted.oid.clone()),
                new_oid: None,
                status: DiffStatus::Deleted,
            },
            (Some(before), Some(after)) => {
                if before == after {
                    continue;
                }
                let status = if mode_class(before.mode) != mode_class(after.mode) {
                    DiffStatus::TypeChanged
                } else {
                    DiffStatus::Modified
                };
                HashDiff {
                    path: path.clone(),
                    old_mode: Some(before.mode),
                    new_mode: Some(after.mode),
                    old_oid: Some(before.oid.clone()),
                    new_oid: Some(after.oid.clone()),
                    status,
                }
            }
            (None, None) => continue,
        };

        diffs.push(diff);
    }

    if options.detect_renames {
        rename::detect_renames(
            &mut diffs,
            old,
            options.rename_threshold,
            old_content,
            new_content,
            cancel,
        )?;
    }

    Ok(diffs)
}

/// File type class used for `TypeChanged` detection
fn mode_class(mode: EntryMode) -> u8 {
    match mode {
        EntryMode::File(_) => 0,
        EntryMode::Symlink => 1,
        EntryMode::Gitlink => 2,
        EntryMode::Directory => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use pretty_assertions::assert_eq;

    fn entry(content: &[u8]) -> DatabaseEntry {
        DatabaseEntry::new(
            DigestKind::Sha1.hash(content),
            EntryMode::File(FileMode::Regular),
        )
    }

    fn no_content(_: &Path, _: &ObjectId) -> anyhow::Result<Bytes> {
        Ok(Bytes::new())
    }

    fn compare(old: &EntrySet, new: &EntrySet, options: &DiffOptions) -> Vec<HashDiff> {
        compare_entry_sets(old, new, options, &no_content, &no_content, &CancelToken::new())
            .unwrap()
    }

    fn plain_options() -> DiffOptions {
        DiffOptions {
            detect_renames: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_added_and_deleted_and_modified() {
        let mut old = EntrySet::new();
        old.insert(PathBuf::from("deleted.txt"), entry(b"gone"));
        old.insert(PathBuf::from("same.txt"), entry(b"same"));
        old.insert(PathBuf::from("changed.txt"), entry(b"before"));

        let mut new = EntrySet::new();
        new.insert(PathBuf::from("added.txt"), entry(b"fresh"));
        new.insert(PathBuf::from("same.txt"), entry(b"same"));
        new.insert(PathBuf::from("changed.txt"), entry(b"after"));

        let diffs = compare(&old, &new, &plain_options());

        let statuses: Vec<(String, DiffStatus)> = diffs
            .iter()
            .map(|diff| (diff.path.display().to_string(), diff.status.clone()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("added.txt".to_string(), DiffStatus::Added),
                ("changed.txt".to_string(), DiffStatus::Modified),
                ("deleted.txt".to_string(), DiffStatus::Deleted),
            ]
        );
    }

    #[test]
    fn test_type_change_detected() {
        let mut old = EntrySet::new();
        old.insert(
            PathBuf::from("link"),
            DatabaseEntry::new(DigestKind::Sha1.hash(b"target"), EntryMode::Symlink),
        );
        let mut new = EntrySet::new();
        new.insert(PathBuf::from("link"), entry(b"target"));

        let diffs = compare(&old, &new, &plain_options());
        assert_eq!(diffs[0].status, DiffStatus::TypeChanged);
    }

    #[test]
    fn test_path_filter_restricts_output() {
        let mut old = EntrySet::new();
        old.insert(PathBuf::from("src/kept.rs"), entry(b"a"));
        old.insert(PathBuf::from("docs/skip.md"), entry(b"b"));

        let options = DiffOptions {
            detect_renames: false,
            paths: vec![PathBuf::from("src")],
            ..Default::default()
        };
        let diffs = compare(&old, &EntrySet::new(), &options);

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, PathBuf::from("src/kept.rs"));
    }

    #[test]
    fn test_diff_symmetry_under_reversal() {
        let mut old = EntrySet::new();
        old.insert(PathBuf::from("deleted.txt"), entry(b"gone"));
        old.insert(PathBuf::from("changed.txt"), entry(b"before"));

        let mut new = EntrySet::new();
        new.insert(PathBuf::from("added.txt"), entry(b"fresh"));
        new.insert(PathBuf::from("changed.txt"), entry(b"after"));

        let forward = compare(&old, &new, &plain_options());
        let backward = compare(&new, &old, &plain_options());

        let reversed: Vec<String> = forward
            .iter()
            .map(|diff| diff.reversed().raw_line(DigestKind::Sha1))
            .collect();
        let expected: Vec<String> = backward
            .iter()
            .map(|diff| diff.raw_line(DigestKind::Sha1))
            .collect();

        assert_eq!(reversed, expected);
    }

    #[test]
    fn test_raw_line_format() {
        let mut old = EntrySet::new();
        old.insert(PathBuf::from("file.txt"), entry(b"before"));
        let mut new = EntrySet::new();
        new.insert(PathBuf::from("file.txt"), entry(b"after"));

        let diffs = compare(&old, &new, &plain_options());
        let line = diffs[0].raw_line(DigestKind::Sha1);

        assert!(line.starts_with(":100644 100644 "));
        assert!(line.ends_with("M\tfile.txt"));
    }
}

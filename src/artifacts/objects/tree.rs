//! Tree object
//!
//! Trees represent directory snapshots. They contain entries for files
//! (blobs) and subdirectories (other trees), along with their names and
//! modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<raw-digest>`
//!
//! ## Ordering
//!
//! Entries are sorted by name, where subtree names sort as if suffixed with
//! `/`. This is the canonical ordering that digests depend on; internally
//! directory names are keyed with the trailing `/` so the map order is the
//! canonical order, and the suffix is stripped on serialization.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

/// Internal tree entry representation for trees being built from the index
#[derive(Debug, Clone)]
enum TreeEntry {
    /// File entry (blob)
    File(IndexEntry),
    /// Directory entry (nested tree)
    Directory(Tree),
}

impl TreeEntry {
    fn mode(&self) -> EntryMode {
        match self {
            TreeEntry::File(entry) => entry.metadata.mode,
            TreeEntry::Directory(_) => EntryMode::Directory,
        }
    }

    fn oid(&self, kind: DigestKind) -> anyhow::Result<ObjectId> {
        match self {
            TreeEntry::File(entry) => Ok(entry.oid.clone()),
            TreeEntry::Directory(tree) => tree.object_id(kind),
        }
    }
}

/// Tree object representing a directory snapshot
///
/// Trees maintain two sets of entries:
/// - `readable_entries`: For trees loaded from the database
/// - `writeable_entries`: For trees being built from the index
///
/// This dual representation allows efficient reading and writing of tree
/// objects.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// Digest variant used when hashing subtrees
    kind: DigestKind,
    /// Entries loaded from database (read mode), dirs keyed with `/` suffix
    readable_entries: BTreeMap<String, DatabaseEntry>,
    /// Entries being built (write mode), dirs keyed with `/` suffix
    writeable_entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    /// Build a tree from index entries
    ///
    /// Creates a hierarchical tree structure from a flat list of index
    /// entries. Files are organized into directories matching their path
    /// structure.
    pub fn build<'e>(
        entries: impl Iterator<Item = &'e IndexEntry>,
        kind: DigestKind,
    ) -> anyhow::Result<Self> {
        let mut root = Tree {
            kind,
            ..Default::default()
        };

        for entry in entries {
            let parents = entry.parent_dirs();
            root.add_entry(&parents, entry)?;
        }

        Ok(root)
    }

    /// Traverse the tree depth-first, calling a function on each node
    ///
    /// Visits children before parents (post-order traversal), which is
    /// necessary for storing trees since child OIDs must be known before
    /// storing the parent.
    pub fn traverse<F>(&self, func: &F) -> anyhow::Result<()>
    where
        F: Fn(&Tree) -> anyhow::Result<()>,
    {
        for entry in &self.writeable_entries {
            if let TreeEntry::Directory(tree) = entry.1 {
                tree.traverse(func)?;
            }
        }
        func(self)?;

        Ok(())
    }

    /// Add an entry to the tree at the appropriate location
    ///
    /// Creates intermediate directory entries as needed.
    fn add_entry(&mut self, parents: &[&Path], entry: &IndexEntry) -> anyhow::Result<()> {
        if parents.is_empty() {
            self.writeable_entries
                .insert(entry.basename()?.to_string(), TreeEntry::File(entry.clone()));
        } else {
            let parent = parents[0]
                .file_name()
                .and_then(|s| s.to_str())
                .context("Invalid parent")?;
            // directory keys carry the trailing '/' so map order is canonical
            let parent = format!("{}/", parent);

            let subtree = match self
                .writeable_entries
                .entry(parent)
                .or_insert_with(|| {
                    TreeEntry::Directory(Tree {
                        kind: self.kind,
                        ..Default::default()
                    })
                }) {
                TreeEntry::Directory(tree) => tree,
                TreeEntry::File(_) => {
                    anyhow::bail!("file entry in the way of directory {:?}", parents[0])
                }
            };
            subtree.add_entry(&parents[1..], entry)?;
        }

        Ok(())
    }

    /// Parse a tree payload for the given digest variant
    ///
    /// Trees are the one object type whose payload embeds raw digests, so
    /// deserialization needs to know the repository's digest width.
    pub fn deserialize_with(reader: impl BufRead, kind: DigestKind) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if *mode_bytes.last().unwrap() != b' ' {
                return Err(anyhow::anyhow!("unexpected EOF in mode"));
            }
            mode_bytes.pop(); // drop the space

            let mode_str = std::str::from_utf8(&mode_bytes)?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || *name_bytes.last().unwrap() != b'\0' {
                return Err(anyhow::anyhow!("unexpected EOF in name"));
            }
            name_bytes.pop(); // drop NUL
            let mut name = std::str::from_utf8(&name_bytes)?.to_owned();
            if mode.is_tree() {
                name.push('/');
            }

            let oid = ObjectId::read_raw_from(&mut reader, kind)
                .context("unexpected EOF in object id")?;

            entries.insert(name, DatabaseEntry::new(oid, mode));
        }

        Ok(Tree {
            kind,
            readable_entries: entries,
            writeable_entries: Default::default(),
        })
    }

    /// Iterate entries with directory suffixes stripped
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DatabaseEntry)> {
        self.readable_entries
            .iter()
            .map(|(name, entry)| (name.trim_end_matches('/'), entry))
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.readable_entries
            .into_iter()
            .map(|(name, entry)| (name.trim_end_matches('/').to_string(), entry))
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseEntry> {
        self.readable_entries
            .get(name)
            .or_else(|| self.readable_entries.get(&format!("{}/", name)))
    }

    pub fn is_empty(&self) -> bool {
        self.readable_entries.is_empty() && self.writeable_entries.is_empty()
    }

    /// Summarize a built tree as cache-tree nodes
    ///
    /// Entry counts cover all file entries beneath each node, matching the
    /// invalidation bookkeeping of the index's `TREE` extension.
    pub fn to_cache_tree(&self, name: &str) -> anyhow::Result<crate::artifacts::index::cache_tree::CacheTree> {
        use crate::artifacts::index::cache_tree::CacheTree;

        let mut entry_count = 0i64;
        let mut children = Vec::new();

        for (child_name, entry) in &self.writeable_entries {
            match entry {
                TreeEntry::File(_) => entry_count += 1,
                TreeEntry::Directory(subtree) => {
                    let child = subtree.to_cache_tree(child_name.trim_end_matches('/'))?;
                    entry_count += child.entry_count;
                    children.push(child);
                }
            }
        }

        Ok(CacheTree {
            name: name.to_string(),
            entry_count,
            oid: Some(self.object_id(self.kind)?),
            children,
        })
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes: Vec<u8> = Vec::new();

        if self.writeable_entries.is_empty() {
            for (name, entry) in &self.readable_entries {
                let name = name.trim_end_matches('/');
                let header = format!("{} {}", entry.mode.as_str(), name);
                content_bytes.write_all(header.as_bytes())?;
                content_bytes.push(0);
                entry.oid.write_raw_to(&mut content_bytes)?;
            }
        } else {
            for (name, tree_entry) in &self.writeable_entries {
                let name = name.trim_end_matches('/');
                let header = format!("{} {}", tree_entry.mode().as_str(), name);
                content_bytes.write_all(header.as_bytes())?;
                content_bytes.push(0);
                tree_entry.oid(self.kind)?.write_raw_to(&mut content_bytes)?;
            }
        }

        let mut tree_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.readable_entries
            .iter()
            .map(|(name, entry)| {
                let object_type = if entry.is_tree() {
                    ObjectType::Tree
                } else {
                    ObjectType::Blob
                };

                format!(
                    "{} {} {}\t{}",
                    entry.mode.as_padded_str(),
                    object_type.as_str(),
                    entry.oid.as_ref(),
                    name.trim_end_matches('/')
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

//! Index (staging area)
//!
//! The index tracks which files should be included in the next commit,
//! including unresolved merge stages. It maintains metadata about files
//! (mode, timestamps, digests) so change detection can usually avoid reading
//! file content.
//!
//! ## Data Structures
//!
//! - `entries`: maps (path, stage) to index entries, kept in canonical order
//! - `children`: maps directory paths to their children for efficient
//!   file/directory conflict handling
//! - `cache_tree`: the parsed `TREE` extension, invalidated on mutation
//!
//! ## Lifecycle
//!
//! The index is read at the start of a logical operation, mutated in memory,
//! and published atomically (`index.lock` + rename) at the end. Readers take
//! a shared lock only for the duration of the read.

use crate::artifacts::core::error::EngineError;
use crate::artifacts::core::lockfile::LockFile;
use crate::artifacts::index::cache_tree::CacheTree;
use crate::artifacts::index::checksum;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{
    EntryMetadata, IndexEntry, STAGE_BASE, STAGE_MERGED, STAGE_OURS, STAGE_THEIRS,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{CACHE_TREE_TAG, HEADER_SIZE};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use crate::artifacts::objects::tree::Tree;
use crate::areas::database::Database;
use anyhow::Context;
use byteorder::{BigEndian, ByteOrder};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Canonical ordering key: path bytes, then merge stage
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EntryKey(String, u8);

impl EntryKey {
    fn for_entry(entry: &IndexEntry) -> anyhow::Result<Self> {
        Ok(EntryKey(entry.path_str()?.to_string(), entry.stage))
    }
}

/// Index (staging area)
///
/// Tracks files staged for the next commit along with their metadata.
/// Persisted with a trailing digest for integrity verification.
#[derive(Debug)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    /// Digest variant of the repository
    kind: DigestKind,
    /// On-disk format version; writes reproduce the version read
    version: u32,
    /// Tracked files mapped by (path, stage)
    entries: BTreeMap<EntryKey, IndexEntry>,
    /// Directory hierarchy for efficient parent-child lookups
    children: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    /// Parsed `TREE` extension, when present
    cache_tree: Option<CacheTree>,
    /// Unrecognized extensions, preserved verbatim in order
    unknown_extensions: Vec<(String, Vec<u8>)>,
    /// Flag indicating if the index has been modified since loading
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>, kind: DigestKind, version: u32) -> Self {
        Index {
            path,
            kind,
            version,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            cache_tree: None,
            unknown_extensions: Vec::new(),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        if self.version != version {
            self.version = version;
            self.changed = true;
        }
    }

    /// Look up the merged (stage 0) entry for a path
    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        let key = EntryKey(path.to_string_lossy().into_owned(), STAGE_MERGED);
        self.entries.get(&key)
    }

    /// All conflict-stage entries for a path, in stage order
    pub fn conflict_entries(&self, path: &Path) -> Vec<&IndexEntry> {
        let name = path.to_string_lossy().into_owned();
        [STAGE_BASE, STAGE_OURS, STAGE_THEIRS]
            .iter()
            .filter_map(|stage| self.entries.get(&EntryKey(name.clone(), *stage)))
            .collect()
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|key| key.1 != STAGE_MERGED)
    }

    /// First path with conflict stages, if any
    pub fn first_conflict(&self) -> Option<PathBuf> {
        self.entries
            .keys()
            .find(|key| key.1 != STAGE_MERGED)
            .map(|key| PathBuf::from(&key.0))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.cache_tree = None;
        self.unknown_extensions.clear();
        self.changed = false;
    }

    /// Load the index from disk
    ///
    /// Reads the index file, verifies the trailing digest, and parses the
    /// header, entries and extensions. A missing or empty file leaves the
    /// index empty.
    ///
    /// ## Locking
    ///
    /// Takes a shared lock on the index file for the duration of the read;
    /// writers are excluded, other readers are not.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();

        if !self.path.exists() {
            return Ok(());
        }

        let mut index_file = std::fs::OpenOptions::new().read(true).open(self.path())?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        let mut data = Vec::new();
        lock.deref_mut().read_to_end(&mut data)?;
        drop(lock);

        if data.is_empty() {
            return Ok(());
        }

        let body = checksum::verify_trailer(&data, self.kind)?;

        let header = IndexHeader::deserialize(&body[..HEADER_SIZE.min(body.len())])?;
        self.version = header.version;

        let mut pos = HEADER_SIZE;
        let mut prev_path = String::new();
        for _ in 0..header.entries_count {
            let (entry, consumed) =
                IndexEntry::deserialize(&body[pos..], self.kind, self.version, &prev_path)?;
            pos += consumed;
            prev_path = entry.path_str()?.to_string();
            self.store_entry(entry)?;
        }

        self.parse_extensions(&body[pos..])?;
        self.changed = false;

        Ok(())
    }

    fn parse_extensions(&mut self, mut data: &[u8]) -> anyhow::Result<()> {
        while !data.is_empty() {
            if data.len() < 8 {
                return Err(EngineError::Corrupt("truncated index extension".to_string()).into());
            }

            let tag = std::str::from_utf8(&data[..4])
                .map_err(|_| EngineError::Corrupt("bad index extension tag".to_string()))?
                .to_string();
            let len = BigEndian::read_u32(&data[4..8]) as usize;
            let payload = data
                .get(8..8 + len)
                .ok_or_else(|| EngineError::Corrupt("truncated index extension".to_string()))?;

            if tag == CACHE_TREE_TAG {
                self.cache_tree = Some(CacheTree::parse(payload, self.kind)?);
            } else {
                self.unknown_extensions.push((tag, payload.to_vec()));
            }

            data = &data[8 + len..];
        }

        Ok(())
    }

    /// Check if a path is tracked directly in the index
    ///
    /// Returns true if the path is either a file entry or has children
    /// (is a directory with tracked files).
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entry_by_path(path).is_some()
            || !self.conflict_entries(path).is_empty()
            || self.children.contains_key(path)
    }

    /// Remove any conflicting entries before adding a new entry
    ///
    /// Removes parent directories that might be file entries, and removes
    /// any children entries if this entry is becoming a file.
    fn discard_conflicts(&mut self, entry: &IndexEntry) -> anyhow::Result<()> {
        for parent in entry.parent_dirs() {
            self.remove_entry_all_stages(&parent.to_path_buf())?;
        }
        self.remove_children(&entry.name.clone())?;

        Ok(())
    }

    fn store_entry(&mut self, entry: IndexEntry) -> anyhow::Result<()> {
        let key = EntryKey::for_entry(&entry)?;
        let parents = entry
            .parent_dirs()
            .into_iter()
            .map(|parent| parent.to_path_buf())
            .collect::<Vec<_>>();

        for parent in parents {
            self.children
                .entry(parent)
                .or_default()
                .insert(entry.name.clone());
        }

        self.entries.insert(key, entry);

        Ok(())
    }

    fn remove_children(&mut self, path: &Path) -> anyhow::Result<()> {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                self.remove_entry_all_stages(&child)?;
            }
        }

        Ok(())
    }

    fn remove_entry_all_stages(&mut self, path: &Path) -> anyhow::Result<()> {
        let name = path.to_string_lossy().into_owned();

        for stage in [STAGE_MERGED, STAGE_BASE, STAGE_OURS, STAGE_THEIRS] {
            let Some(entry) = self.entries.remove(&EntryKey(name.clone(), stage)) else {
                continue;
            };

            for parent in entry.parent_dirs() {
                let parent = parent.to_path_buf();
                if let Some(children) = self.children.get_mut(&parent) {
                    children.remove(&entry.name);
                    if children.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
        }

        Ok(())
    }

    /// Insert or replace the merged entry for a path
    ///
    /// Any conflict stages for the path are removed: staging a resolution
    /// collapses the conflict.
    pub fn add(&mut self, entry: IndexEntry) -> anyhow::Result<()> {
        self.remove_entry_all_stages(&entry.name.clone())?;
        self.discard_conflicts(&entry)?;
        self.invalidate_cache_tree(&entry.name.clone());
        self.store_entry(entry)?;
        self.changed = true;

        Ok(())
    }

    /// Remove a path (all stages) from the index
    pub fn remove(&mut self, path: PathBuf) -> anyhow::Result<()> {
        self.invalidate_cache_tree(&path);
        self.remove_entry_all_stages(&path)?;
        self.remove_children(&path)?;
        self.changed = true;

        Ok(())
    }

    /// Record a three-way conflict for a path
    ///
    /// The merged entry is removed and the provided sides land at stages
    /// 1 (base), 2 (ours) and 3 (theirs). Absent sides stay absent.
    pub fn stage_conflict(
        &mut self,
        path: &Path,
        base: Option<(ObjectId, EntryMode)>,
        ours: Option<(ObjectId, EntryMode)>,
        theirs: Option<(ObjectId, EntryMode)>,
    ) -> anyhow::Result<()> {
        self.remove_entry_all_stages(path)?;
        self.invalidate_cache_tree(path);

        let stages = [
            (STAGE_BASE, base),
            (STAGE_OURS, ours),
            (STAGE_THEIRS, theirs),
        ];
        for (stage, side) in stages {
            if let Some((oid, mode)) = side {
                let metadata = EntryMetadata {
                    mode,
                    ..Default::default()
                };
                self.store_entry(IndexEntry::at_stage(
                    path.to_path_buf(),
                    oid,
                    metadata,
                    stage,
                ))?;
            }
        }

        self.changed = true;

        Ok(())
    }

    fn invalidate_cache_tree(&mut self, path: &Path) {
        if let Some(cache_tree) = &mut self.cache_tree {
            cache_tree.invalidate(path);
        }
    }

    /// Refresh cached stat metadata for an entry after a racy check
    pub fn update_entry_stat(&mut self, entry: &IndexEntry, stat: EntryMetadata) {
        if let Ok(key) = EntryKey::for_entry(entry)
            && let Some(existing_entry) = self.entries.get_mut(&key)
        {
            existing_entry.metadata = stat;
            self.changed = true;
        }
    }

    /// Replace the whole entry table (used by read-tree)
    pub fn replace_entries(&mut self, entries: Vec<IndexEntry>) -> anyhow::Result<()> {
        self.entries.clear();
        self.children.clear();
        self.cache_tree = None;

        for entry in entries {
            self.store_entry(entry)?;
        }
        self.changed = true;

        Ok(())
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Merged (stage 0) entries only
    pub fn merged_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries
            .iter()
            .filter(|(key, _)| key.1 == STAGE_MERGED)
            .map(|(_, entry)| entry)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries_under_path(&self, path: &Path) -> Vec<PathBuf> {
        self.entries
            .values()
            .filter(|entry| {
                if path == Path::new(".") || path.as_os_str().is_empty() {
                    return true;
                }
                entry.name.starts_with(path) || entry.name == path
            })
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Write the index atomically to disk
    ///
    /// Serializes header, entries, extensions and trailing digest into
    /// `index.lock`, then renames it over the index file. A no-op when the
    /// index is unchanged.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        if !self.changed {
            return Ok(());
        }

        let mut lock = LockFile::acquire(&self.path)?;

        let mut buffer = Vec::new();
        let header = IndexHeader::new(self.version, self.entries.len() as u32);
        buffer.extend_from_slice(&header.serialize()?);

        let mut prev_path = String::new();
        for entry in self.entries.values() {
            let entry_bytes = entry.serialize(self.version, &prev_path)?;
            buffer.extend_from_slice(&entry_bytes);
            prev_path = entry.path_str()?.to_string();
        }

        if let Some(cache_tree) = &self.cache_tree {
            let mut payload = Vec::new();
            cache_tree.serialize(&mut payload);
            buffer.extend_from_slice(CACHE_TREE_TAG.as_bytes());
            buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            buffer.extend_from_slice(&payload);
        }
        for (tag, payload) in &self.unknown_extensions {
            buffer.extend_from_slice(tag.as_bytes());
            buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
            buffer.extend_from_slice(payload);
        }

        checksum::append_trailer(&mut buffer, self.kind);

        lock.write_all(&buffer)?;
        lock.commit()?;
        self.changed = false;

        debug!(entries = self.entries.len(), version = self.version, "wrote index");

        Ok(())
    }

    /// Materialize the staged tree, returning its digest
    ///
    /// Uses the cache-tree extension when its root is still valid; otherwise
    /// builds the tree hierarchy, stores every subtree, and refreshes the
    /// cache. Fails with `MergeConflict` while conflict stages remain.
    pub fn write_tree(&mut self, database: &Database) -> anyhow::Result<ObjectId> {
        if let Some(path) = self.first_conflict() {
            return Err(EngineError::MergeConflict(path).into());
        }

        if let Some(cache_tree) = &self.cache_tree
            && cache_tree.is_valid()
        {
            let oid = cache_tree.oid.clone().expect("valid node has a digest");
            return Ok(oid);
        }

        let entries: Vec<IndexEntry> = self.merged_entries().cloned().collect();
        let root = Tree::build(entries.iter(), self.kind)?;

        root.traverse(&|tree| {
            database.store(tree)?;
            Ok(())
        })
        .context("failed to store staged trees")?;

        let root_oid = root.object_id(self.kind)?;
        self.cache_tree = Some(root.to_cache_tree("")?);
        self.changed = true;

        Ok(root_oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::DEFAULT_VERSION;
    use crate::artifacts::index::entry_mode::FileMode;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn entry(path: &str, content: &[u8]) -> IndexEntry {
        IndexEntry::from_parts(
            PathBuf::from(path),
            DigestKind::Sha1.hash(content),
            EntryMetadata {
                mode: EntryMode::File(FileMode::Regular),
                size: content.len() as u64,
                ..Default::default()
            },
        )
    }

    #[fixture]
    fn index() -> (assert_fs::TempDir, Index) {
        let dir = assert_fs::TempDir::new().unwrap();
        let index = Index::new(
            dir.path().join("index").into_boxed_path(),
            DigestKind::Sha1,
            DEFAULT_VERSION,
        );
        (dir, index)
    }

    #[rstest]
    fn test_write_and_rehydrate_round_trip(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;

        index.add(entry("a.txt", b"alpha")).unwrap();
        index.add(entry("dir/b.txt", b"beta")).unwrap();
        index.write_updates().unwrap();

        let mut reloaded = Index::new(
            index.path().to_path_buf().into_boxed_path(),
            DigestKind::Sha1,
            DEFAULT_VERSION,
        );
        reloaded.rehydrate().unwrap();

        let paths: Vec<_> = reloaded.entries().map(|e| e.name.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("dir/b.txt")]);
    }

    #[rstest]
    fn test_reserialization_reproduces_bytes(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;

        index.add(entry("a.txt", b"alpha")).unwrap();
        index.add(entry("dir/nested/c.txt", b"gamma")).unwrap();
        index.write_updates().unwrap();
        let original = std::fs::read(index.path()).unwrap();

        let mut reloaded = Index::new(
            index.path().to_path_buf().into_boxed_path(),
            DigestKind::Sha1,
            DEFAULT_VERSION,
        );
        reloaded.rehydrate().unwrap();
        reloaded.changed = true;
        reloaded.write_updates().unwrap();
        let rewritten = std::fs::read(index.path()).unwrap();

        assert_eq!(original, rewritten);
    }

    #[rstest]
    fn test_version_4_round_trip(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;
        index.set_version(4);

        index.add(entry("src/areas/database.rs", b"db")).unwrap();
        index.add(entry("src/areas/index.rs", b"idx")).unwrap();
        index.add(entry("src/lib.rs", b"lib")).unwrap();
        index.write_updates().unwrap();

        let mut reloaded = Index::new(
            index.path().to_path_buf().into_boxed_path(),
            DigestKind::Sha1,
            DEFAULT_VERSION,
        );
        reloaded.rehydrate().unwrap();

        assert_eq!(reloaded.version(), 4);
        let paths: Vec<_> = reloaded.entries().map(|e| e.name.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("src/areas/database.rs"),
                PathBuf::from("src/areas/index.rs"),
                PathBuf::from("src/lib.rs"),
            ]
        );
    }

    #[rstest]
    fn test_corrupted_trailer_fails_rehydrate(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;

        index.add(entry("a.txt", b"alpha")).unwrap();
        index.write_updates().unwrap();

        let mut data = std::fs::read(index.path()).unwrap();
        let len = data.len();
        data[len - 1] ^= 0xFF;
        std::fs::write(index.path(), &data).unwrap();

        let mut reloaded = Index::new(
            index.path().to_path_buf().into_boxed_path(),
            DigestKind::Sha1,
            DEFAULT_VERSION,
        );
        assert!(reloaded.rehydrate().is_err());
    }

    #[rstest]
    fn test_file_replacing_directory_discards_children(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;

        index.add(entry("dir/a.txt", b"a")).unwrap();
        index.add(entry("dir/b.txt", b"b")).unwrap();
        index.add(entry("dir", b"now a file")).unwrap();

        let paths: Vec<_> = index.entries().map(|e| e.name.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("dir")]);
    }

    #[rstest]
    fn test_directory_replacing_file_discards_parent_entry(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;

        index.add(entry("dir", b"a file")).unwrap();
        index.add(entry("dir/a.txt", b"a")).unwrap();

        let paths: Vec<_> = index.entries().map(|e| e.name.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("dir/a.txt")]);
    }

    #[rstest]
    fn test_conflict_stages_exclude_stage_zero(index: (assert_fs::TempDir, Index)) {
        let (_dir, mut index) = index;
        let mode = EntryMode::File(FileMode::Regular);

        index.add(entry("file.txt", b"merged")).unwrap();
        index
            .stage_conflict(
                Path::new("file.txt"),
                Some((DigestKind::Sha1.hash(b"base"), mode)),
                Some((DigestKind::Sha1.hash(b"ours"), mode)),
                Some((DigestKind::Sha1.hash(b"theirs"), mode)),
            )
            .unwrap();

        assert!(index.entry_by_path(Path::new("file.txt")).is_none());
        assert_eq!(index.conflict_entries(Path::new("file.txt")).len(), 3);
        assert!(index.has_conflicts());

        // staging a resolution collapses the conflict back to stage 0
        index.add(entry("file.txt", b"resolved")).unwrap();
        assert!(index.entry_by_path(Path::new("file.txt")).is_some());
        assert!(!index.has_conflicts());
    }

    #[rstest]
    fn test_write_tree_builds_and_caches(index: (assert_fs::TempDir, Index)) {
        let (dir, mut index) = index;
        let database = Database::new(
            dir.path().join("objects").into_boxed_path(),
            DigestKind::Sha1,
        );

        index.add(entry("a.txt", b"alpha")).unwrap();
        index.add(entry("dir/b.txt", b"beta")).unwrap();

        let first = index.write_tree(&database).unwrap();
        // second call hits the refreshed cache tree
        let second = index.write_tree(&database).unwrap();

        assert_eq!(first, second);
        assert!(database.has(&first));
    }

    #[rstest]
    fn test_write_tree_rejects_conflicts(index: (assert_fs::TempDir, Index)) {
        let (dir, mut index) = index;
        let database = Database::new(
            dir.path().join("objects").into_boxed_path(),
            DigestKind::Sha1,
        );
        let mode = EntryMode::File(FileMode::Regular);

        index
            .stage_conflict(
                Path::new("file.txt"),
                None,
                Some((DigestKind::Sha1.hash(b"ours"), mode)),
                Some((DigestKind::Sha1.hash(b"theirs"), mode)),
            )
            .unwrap();

        assert!(index.write_tree(&database).is_err());
    }
}

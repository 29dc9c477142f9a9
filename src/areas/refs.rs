//! References (branches, HEAD, tags)
//!
//! References are human-readable names pointing at commits. A reference is
//! either direct (containing a digest) or symbolic (pointing at another
//! reference, like HEAD normally does).
//!
//! ## Storage
//!
//! - Loose refs: one file per ref under `refs/`, containing a hex digest or
//!   `ref: <target>` for symbolic refs
//! - Packed refs: a single sorted `packed-refs` file of `<digest> <name>`
//!   lines; loose refs override packed ones
//! - Reflog: `logs/<name>`, one line appended per update:
//!   `<old> <new> <who> <timestamp> <tz>\t<message>`
//!
//! ## Atomicity
//!
//! Updates go through `<name>.lock`: the new value is written to the lock,
//! the expected old value is compared under the lock (CAS), and the lock is
//! renamed over the ref. Concurrent writers to the same ref fail fast with
//! a bounded retry, then `LockTimeout`.

use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::core::error::EngineError;
use crate::artifacts::core::lockfile::LockFile;
use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use anyhow::Context;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Name of the HEAD reference
pub const HEAD_REF_NAME: &str = "HEAD";

/// Maximum symbolic dereference depth before reporting a loop
const MAX_SYMREF_DEPTH: usize = 5;

/// Value stored in a reference file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    /// Direct reference holding a digest
    Direct(ObjectId),
    /// Symbolic reference naming another ref
    Symbolic(String),
}

/// One line of a reflog
#[derive(Debug, Clone)]
pub struct ReflogEntry {
    pub old_oid: ObjectId,
    pub new_oid: ObjectId,
    pub message: String,
}

/// References manager
///
/// Handles reading and writing references (branches, HEAD, tags) and the
/// reflog. The ref store owns the ref files and `logs/` exclusively.
#[derive(Debug)]
pub struct Refs {
    /// Path to the repository directory (typically `.git`)
    path: Box<Path>,
    /// Digest variant of the repository
    kind: DigestKind,
}

impl Refs {
    pub fn new(path: Box<Path>, kind: DigestKind) -> Self {
        Refs { path, kind }
    }

    /// Read a reference's stored value without dereferencing
    ///
    /// Loose storage wins over packed-refs.
    pub fn read(&self, name: &str) -> anyhow::Result<Option<RefValue>> {
        let ref_path = self.path.join(name);

        if ref_path.is_file() {
            let content = std::fs::read_to_string(&ref_path)
                .with_context(|| format!("failed to read ref file at {:?}", ref_path))?;
            let content = content.trim();

            if content.is_empty() {
                return Ok(None);
            }

            if let Some(target) = content.strip_prefix("ref: ") {
                return Ok(Some(RefValue::Symbolic(target.trim().to_string())));
            }

            return Ok(Some(RefValue::Direct(ObjectId::try_parse(
                content.to_string(),
            )?)));
        }

        Ok(self.packed_refs()?.remove(name).map(RefValue::Direct))
    }

    /// Resolve a reference to a digest, following symbolic refs
    ///
    /// Dereferencing is bounded; deeper chains fail with `RefLoop`. A ref
    /// that does not exist fails with `NotFound`.
    pub fn resolve(&self, name: &str) -> anyhow::Result<ObjectId> {
        self.resolve_depth(name, 0)?
            .ok_or_else(|| EngineError::NotFound(format!("ref '{}'", name)).into())
    }

    /// Resolve a reference, returning None for missing or unborn refs
    pub fn try_resolve(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        self.resolve_depth(name, 0)
    }

    fn resolve_depth(&self, name: &str, depth: usize) -> anyhow::Result<Option<ObjectId>> {
        if depth > MAX_SYMREF_DEPTH {
            return Err(EngineError::RefLoop(name.to_string()).into());
        }

        match self.read(name)? {
            Some(RefValue::Direct(oid)) => Ok(Some(oid)),
            Some(RefValue::Symbolic(target)) => self.resolve_depth(&target, depth + 1),
            None => Ok(None),
        }
    }

    /// Follow symbolic references to the name of the final ref
    ///
    /// For an attached HEAD this yields the current branch ref; a direct
    /// ref yields its own name.
    pub fn resolve_symbolic_name(&self, name: &str) -> anyhow::Result<String> {
        let mut current = name.to_string();

        for _ in 0..=MAX_SYMREF_DEPTH {
            match self.read(&current)? {
                Some(RefValue::Symbolic(target)) => current = target,
                _ => return Ok(current),
            }
        }

        Err(EngineError::RefLoop(name.to_string()).into())
    }

    /// Update a reference with an optional compare-and-swap check
    ///
    /// When `no_deref` is false and the named ref is symbolic, the update is
    /// applied to the target of the chain. With `expected_old` set, the
    /// current value is compared under the lock and a mismatch fails with
    /// `RefConflict` while leaving the ref untouched. Every successful
    /// update appends a reflog line.
    pub fn update(
        &self,
        name: &str,
        new_oid: ObjectId,
        expected_old: Option<&ObjectId>,
        message: &str,
        no_deref: bool,
    ) -> anyhow::Result<()> {
        let target_name = if no_deref {
            name.to_string()
        } else {
            self.resolve_symbolic_name(name)?
        };

        let ref_path = self.path.join(&target_name);
        let mut lock = LockFile::acquire(&ref_path)?;

        // read the actual old value under the lock; a symbolic value being
        // replaced wholesale (detach) still compares its resolved digest
        let actual_old = match self.read(&target_name)? {
            Some(RefValue::Direct(oid)) => Some(oid),
            Some(RefValue::Symbolic(_)) => self.try_resolve(&target_name)?,
            None => None,
        };

        if let Some(expected) = expected_old
            && actual_old.as_ref() != Some(expected)
        {
            lock.rollback()?;
            return Err(EngineError::RefConflict(target_name).into());
        }

        lock.write_all(format!("{}\n", new_oid.as_ref()).as_bytes())?;
        lock.commit()?;

        debug!(name = %target_name, new = %new_oid, "updated ref");

        self.append_reflog(&target_name, actual_old.as_ref(), &new_oid, message)?;
        if !no_deref && name != target_name {
            // HEAD's own log also records updates applied through it
            self.append_reflog(name, actual_old.as_ref(), &new_oid, message)?;
        }

        Ok(())
    }

    /// Point a symbolic reference at another ref
    pub fn set_symbolic(&self, name: &str, target: &str, message: &str) -> anyhow::Result<()> {
        let ref_path = self.path.join(name);
        let old_oid = self.try_resolve(name)?;

        let mut lock = LockFile::acquire(&ref_path)?;
        lock.write_all(format!("ref: {}\n", target).as_bytes())?;
        lock.commit()?;

        let new_oid = self.try_resolve(name)?;
        self.append_reflog(
            name,
            old_oid.as_ref(),
            &new_oid.unwrap_or_else(|| self.kind.null_oid()),
            message,
        )?;

        Ok(())
    }

    /// List references under a prefix, resolved to digests and sorted
    ///
    /// Merges loose refs over packed refs.
    pub fn list(&self, prefix: &str) -> anyhow::Result<Vec<(String, ObjectId)>> {
        let mut merged: BTreeMap<String, ObjectId> = self
            .packed_refs()?
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .collect();

        let loose_root = self.path.join(prefix);
        if loose_root.exists() {
            for entry in WalkDir::new(&loose_root)
                .into_iter()
                .filter_map(|entry| entry.ok())
            {
                if !entry.path().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(self.path.as_ref()) else {
                    continue;
                };
                let name = relative.to_string_lossy().to_string();
                if let Some(oid) = self.try_resolve(&name)? {
                    merged.insert(name, oid);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn packed_refs(&self) -> anyhow::Result<BTreeMap<String, ObjectId>> {
        let packed_path = self.path.join("packed-refs");
        let mut refs = BTreeMap::new();

        if !packed_path.exists() {
            return Ok(refs);
        }

        let content = std::fs::read_to_string(&packed_path)
            .with_context(|| format!("failed to read {:?}", packed_path))?;

        for line in content.lines() {
            // comments and peeled-tag lines carry no ref of their own
            if line.starts_with('#') || line.starts_with('^') || line.is_empty() {
                continue;
            }

            let (oid, name) = line.split_once(' ').ok_or_else(|| {
                EngineError::Corrupt(format!("malformed packed-refs line: {}", line))
            })?;
            refs.insert(name.to_string(), ObjectId::try_parse(oid.to_string())?);
        }

        Ok(refs)
    }

    /// Append one line to a ref's log, creating it as needed
    fn append_reflog(
        &self,
        name: &str,
        old_oid: Option<&ObjectId>,
        new_oid: &ObjectId,
        message: &str,
    ) -> anyhow::Result<()> {
        let log_path = self.path.join("logs").join(name);
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create reflog directory for {}", name))?;
        }

        let who = Author::load_from_env("GIT_COMMITTER");
        let line = format!(
            "{} {} {} {} {}\t{}\n",
            old_oid
                .cloned()
                .unwrap_or_else(|| self.kind.null_oid())
                .as_ref(),
            new_oid.as_ref(),
            who.display_name(),
            who.timestamp().timestamp(),
            who.timezone(),
            message
        );

        let mut log_file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .with_context(|| format!("failed to open reflog at {:?}", log_path))?;
        log_file.write_all(line.as_bytes())?;

        Ok(())
    }

    /// Read a ref's log, newest entry first
    ///
    /// Feeds the `@{N}` revision selector.
    pub fn read_reflog(&self, name: &str) -> anyhow::Result<Vec<ReflogEntry>> {
        let log_path = self.path.join("logs").join(name);
        if !log_path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&log_path)
            .with_context(|| format!("failed to read reflog at {:?}", log_path))?;

        let mut entries = Vec::new();
        for line in content.lines() {
            let message = line.split_once('\t').map(|(_, m)| m).unwrap_or("");
            let mut fields = line.split(' ');
            let (Some(old), Some(new)) = (fields.next(), fields.next()) else {
                return Err(
                    EngineError::Corrupt(format!("malformed reflog line: {}", line)).into(),
                );
            };

            entries.push(ReflogEntry {
                old_oid: ObjectId::try_parse(old.to_string())?,
                new_oid: ObjectId::try_parse(new.to_string())?,
                message: message.to_string(),
            });
        }

        entries.reverse();
        Ok(entries)
    }

    /// Read HEAD's digest, if born
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.try_resolve(HEAD_REF_NAME)
    }

    /// The branch HEAD points at, or None when detached
    pub fn current_branch(&self) -> anyhow::Result<Option<BranchName>> {
        match self.read(HEAD_REF_NAME)? {
            Some(RefValue::Symbolic(target)) => {
                let name = target
                    .strip_prefix("refs/heads/")
                    .unwrap_or(&target)
                    .to_string();
                Ok(Some(BranchName::try_parse(name)?))
            }
            _ => Ok(None),
        }
    }

    /// Create a branch pointing at a commit
    pub fn create_branch(&self, name: &BranchName, source_oid: ObjectId) -> anyhow::Result<()> {
        let ref_name = format!("refs/heads/{}", name);

        if self.read(&ref_name)?.is_some() {
            anyhow::bail!("branch {} already exists", name);
        }

        self.update(
            &ref_name,
            source_oid,
            None,
            &format!("branch: Created from {}", name),
            true,
        )
    }

    pub fn branch_exists(&self, name: &BranchName) -> anyhow::Result<bool> {
        Ok(self.read(&format!("refs/heads/{}", name))?.is_some())
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn refs() -> (assert_fs::TempDir, Refs) {
        let dir = assert_fs::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        let refs = Refs::new(dir.path().to_path_buf().into_boxed_path(), DigestKind::Sha1);
        (dir, refs)
    }

    fn oid(data: &[u8]) -> ObjectId {
        DigestKind::Sha1.hash(data)
    }

    #[rstest]
    fn test_update_and_resolve_direct_ref(refs: (assert_fs::TempDir, Refs)) {
        let (_dir, refs) = refs;
        let target = oid(b"commit one");

        refs.update("refs/heads/main", target.clone(), None, "test: create", true)
            .unwrap();

        assert_eq!(refs.resolve("refs/heads/main").unwrap(), target);
    }

    #[rstest]
    fn test_symbolic_head_resolves_through_branch(refs: (assert_fs::TempDir, Refs)) {
        let (_dir, refs) = refs;
        let target = oid(b"commit one");

        refs.update("refs/heads/main", target.clone(), None, "test: create", true)
            .unwrap();
        refs.set_symbolic(HEAD_REF_NAME, "refs/heads/main", "checkout: moving to main")
            .unwrap();

        assert_eq!(refs.resolve(HEAD_REF_NAME).unwrap(), target);
        assert_eq!(
            refs.current_branch().unwrap().unwrap().as_ref(),
            "main"
        );
    }

    #[rstest]
    fn test_update_through_symbolic_head_moves_branch(refs: (assert_fs::TempDir, Refs)) {
        let (_dir, refs) = refs;
        let first = oid(b"one");
        let second = oid(b"two");

        refs.update("refs/heads/main", first.clone(), None, "create", true)
            .unwrap();
        refs.set_symbolic(HEAD_REF_NAME, "refs/heads/main", "checkout").unwrap();

        // deref update lands on the branch, not on HEAD itself
        refs.update(HEAD_REF_NAME, second.clone(), Some(&first), "commit", false)
            .unwrap();

        assert_eq!(refs.resolve("refs/heads/main").unwrap(), second);
        assert!(matches!(
            refs.read(HEAD_REF_NAME).unwrap(),
            Some(RefValue::Symbolic(_))
        ));
    }

    #[rstest]
    fn test_cas_mismatch_leaves_ref_untouched(refs: (assert_fs::TempDir, Refs)) {
        let (_dir, refs) = refs;
        let current = oid(b"current");
        let stale = oid(b"stale");
        let wanted = oid(b"wanted");

        refs.update("refs/heads/main", current.clone(), None, "create", true)
            .unwrap();

        let err = refs
            .update("refs/heads/main", wanted, Some(&stale), "race", true)
            .unwrap_err();

        assert!(matches!(
            crate::artifacts::core::error::engine_error(&err),
            Some(EngineError::RefConflict(_))
        ));
        assert_eq!(refs.resolve("refs/heads/main").unwrap(), current);
    }

    #[rstest]
    fn test_cas_retry_observes_new_value(refs: (assert_fs::TempDir, Refs)) {
        let (_dir, refs) = refs;
        let first = oid(b"one");
        let second = oid(b"two");
        let third = oid(b"three");

        refs.update("refs/heads/main", first.clone(), None, "create", true)
            .unwrap();
        refs.update("refs/heads/main", second.clone(), Some(&first), "win", true)
            .unwrap();

        // the losing writer retries with the observed value and succeeds
        assert!(
            refs.update("refs/heads/main", third.clone(), Some(&first), "lose", true)
                .is_err()
        );
        refs.update("refs/heads/main", third.clone(), Some(&second), "retry", true)
            .unwrap();

        assert_eq!(refs.resolve("refs/heads/main").unwrap(), third);
    }

    #[rstest]
    fn test_loose_overrides_packed(refs: (assert_fs::TempDir, Refs)) {
        let (dir, refs) = refs;
        let packed = oid(b"packed");
        let loose = oid(b"loose");

        std::fs::write(
            dir.path().join("packed-refs"),
            format!(
                "# pack-refs with: peeled fully-peeled sorted\n{} refs/heads/main\n",
                packed.as_ref()
            ),
        )
        .unwrap();

        assert_eq!(refs.resolve("refs/heads/main").unwrap(), packed);

        refs.update("refs/heads/main", loose.clone(), None, "override", true)
            .unwrap();
        assert_eq!(refs.resolve("refs/heads/main").unwrap(), loose);
    }

    #[rstest]
    fn test_symref_loop_detected(refs: (assert_fs::TempDir, Refs)) {
        let (dir, refs) = refs;

        std::fs::write(dir.path().join("refs/heads/a"), "ref: refs/heads/b\n").unwrap();
        std::fs::write(dir.path().join("refs/heads/b"), "ref: refs/heads/a\n").unwrap();

        let err = refs.resolve("refs/heads/a").unwrap_err();
        assert!(matches!(
            crate::artifacts::core::error::engine_error(&err),
            Some(EngineError::RefLoop(_))
        ));
    }

    #[rstest]
    fn test_reflog_records_updates_newest_first(refs: (assert_fs::TempDir, Refs)) {
        let (_dir, refs) = refs;
        let first = oid(b"one");
        let second = oid(b"two");

        refs.update("refs/heads/main", first.clone(), None, "first", true)
            .unwrap();
        refs.update("refs/heads/main", second.clone(), None, "second", true)
            .unwrap();

        let log = refs.read_reflog("refs/heads/main").unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].new_oid, second);
        assert_eq!(log[0].message, "second");
        assert_eq!(log[1].new_oid, first);
        assert!(log[1].old_oid.is_null());
    }

    #[rstest]
    fn test_list_merges_loose_and_packed_sorted(refs: (assert_fs::TempDir, Refs)) {
        let (dir, refs) = refs;
        let packed = oid(b"packed");
        let loose = oid(b"loose");

        std::fs::write(
            dir.path().join("packed-refs"),
            format!("{} refs/heads/alpha\n", packed.as_ref()),
        )
        .unwrap();
        refs.update("refs/heads/beta", loose.clone(), None, "create", true)
            .unwrap();

        let listed = refs.list("refs/heads").unwrap();
        assert_eq!(
            listed,
            vec![
                ("refs/heads/alpha".to_string(), packed),
                ("refs/heads/beta".to_string(), loose),
            ]
        );
    }
}

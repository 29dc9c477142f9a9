//! Three-way read-tree
//!
//! The engine that powers checkout and fast-forward merge. Given up to
//! three trees (O = original HEAD, A = target, B = merge-from), the walk's
//! per-path triples are resolved by the standard policy:
//!
//! - sides A and B agree: take A
//! - only B changed relative to O: take B (the fast-forward case)
//! - only A changed relative to O: take A
//! - all three differ: record conflict stages 1/2/3
//!
//! Everything is planned before anything is touched: conflict checks run
//! against the working tree first, then workdir mutations are applied under
//! a cancellation guard, and the index is written last.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::conflict::{ConflictType, ConflictsSet, conflicts_error};
use crate::artifacts::checkout::tree_walk::{TreeWalkEntry, WALK_SIDES, walk_trees};
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Explicitly enumerated read-tree behavior
///
/// - `update`: mutate the working tree to match the result
/// - `merge`: refuse to clobber local modifications (`WorkdirDirty`)
/// - `reset`: overwrite unconditionally, suppressing the checks
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadTreeOptions {
    pub update: bool,
    pub merge: bool,
    pub reset: bool,
}

/// How one path resolved under the merge policy
#[derive(Debug, Clone)]
enum Resolution {
    /// The path settles on this entry (None removes it)
    Take(Option<DatabaseEntry>),
    /// The sides disagree; record stages 1/2/3
    Conflict([Option<DatabaseEntry>; WALK_SIDES]),
}

/// Planned working tree mutation
#[derive(Debug, Clone)]
enum WorkdirAction {
    Write { path: PathBuf, entry: DatabaseEntry },
    Chmod { path: PathBuf, entry: DatabaseEntry },
    Delete { path: PathBuf },
}

/// Three-way tree reader
///
/// Plans and executes the transition of index and working tree onto the
/// merged result of up to three trees.
pub struct ReadTree<'r> {
    repository: &'r Repository,
    options: ReadTreeOptions,
    cancel: CancelToken,
}

impl<'r> ReadTree<'r> {
    pub fn new(repository: &'r Repository, options: ReadTreeOptions, cancel: CancelToken) -> Self {
        ReadTree {
            repository,
            options,
            cancel,
        }
    }

    /// Run the read-tree over `(O, A, B)` against the given index
    ///
    /// On success the index holds the merged result (written to disk last);
    /// with `update` set the working tree matches it. On conflict-check
    /// failure nothing is mutated.
    pub fn read_tree(
        &self,
        index: &mut Index,
        trees: [Option<&ObjectId>; WALK_SIDES],
    ) -> anyhow::Result<()> {
        let walked = walk_trees(self.repository.database(), trees, &self.cancel)?;

        let mut resolutions: Vec<(PathBuf, Resolution)> = Vec::new();
        let mut actions: Vec<WorkdirAction> = Vec::new();
        let mut conflicts = ConflictsSet::new();

        for entry in &walked {
            self.cancel.check()?;

            let resolution = Self::resolve_sides(&entry.sides);
            if self.options.update {
                self.plan_workdir(index, entry, &resolution, &mut actions, &mut conflicts)?;
            }
            resolutions.push((entry.path.clone(), resolution));
        }

        if let Some(error) = conflicts_error(&conflicts) {
            return Err(error);
        }

        debug!(
            paths = resolutions.len(),
            actions = actions.len(),
            "read-tree planned"
        );

        if self.options.update {
            self.apply_workdir(&actions)?;
        }
        self.apply_index(index, resolutions)?;
        index.write_updates()?;

        Ok(())
    }

    /// The three-way merge policy over one path's sides
    fn resolve_sides(sides: &[Option<DatabaseEntry>; WALK_SIDES]) -> Resolution {
        let [o, a, b] = sides;

        if a == b {
            // both sides agree (also covers: unchanged, removed everywhere)
            Resolution::Take(a.clone())
        } else if o == a {
            // only B changed: fast-forward to it
            Resolution::Take(b.clone())
        } else if o == b {
            // only A changed
            Resolution::Take(a.clone())
        } else {
            Resolution::Conflict([o.clone(), a.clone(), b.clone()])
        }
    }

    /// Plan workdir actions for a path and collect conflicts
    fn plan_workdir(
        &self,
        index: &Index,
        walk_entry: &TreeWalkEntry,
        resolution: &Resolution,
        actions: &mut Vec<WorkdirAction>,
        conflicts: &mut ConflictsSet,
    ) -> anyhow::Result<()> {
        let path = &walk_entry.path;
        let current = index.entry_by_path(path);

        let action = match resolution {
            Resolution::Conflict(_) => None, // stages only, workdir untouched
            Resolution::Take(Some(target)) => {
                let oid_differs = current.map(|entry| &entry.oid) != Some(&target.oid);
                let missing = !self.repository.workspace().exists(path);

                if oid_differs || missing {
                    Some(WorkdirAction::Write {
                        path: path.clone(),
                        entry: target.clone(),
                    })
                } else if current.is_some_and(|entry| entry.metadata.mode != target.mode) {
                    Some(WorkdirAction::Chmod {
                        path: path.clone(),
                        entry: target.clone(),
                    })
                } else {
                    None
                }
            }
            Resolution::Take(None) => current.map(|_| WorkdirAction::Delete { path: path.clone() }),
        };

        let Some(action) = action else {
            return Ok(());
        };

        if self.options.merge && !self.options.reset {
            self.check_for_conflict(index, walk_entry, &action, conflicts)?;
        }
        actions.push(action);

        Ok(())
    }

    /// Refuse to lose working tree state the update did not account for
    fn check_for_conflict(
        &self,
        index: &Index,
        walk_entry: &TreeWalkEntry,
        action: &WorkdirAction,
        conflicts: &mut ConflictsSet,
    ) -> anyhow::Result<()> {
        let path = &walk_entry.path;
        let workspace = self.repository.workspace();

        let Ok(stat) = workspace.stat_file(path) else {
            return Ok(()); // nothing on disk, nothing to lose
        };

        if stat.mode.is_tree() {
            // a directory sits where a file must go
            if matches!(action, WorkdirAction::Write { .. } | WorkdirAction::Chmod { .. })
                && workspace.has_files_under(path)
            {
                conflicts
                    .entry(ConflictType::StaleDirectory)
                    .or_default()
                    .push(path.clone());
            }
            return Ok(());
        }

        let tracked = index.entry_by_path(path).is_some();
        if !tracked {
            let conflict_type = match action {
                WorkdirAction::Delete { .. } => ConflictType::UntrackedRemoved,
                _ => ConflictType::UntrackedOverwritten,
            };
            conflicts.entry(conflict_type).or_default().push(path.clone());
            return Ok(());
        }

        // a tracked file may be overwritten only when it matches O or A
        let workdir_oid = self.workdir_blob_oid(path)?;
        let matches_side = |side: &Option<DatabaseEntry>| {
            side.as_ref()
                .is_some_and(|entry| entry.oid == workdir_oid && entry.mode == stat.mode)
        };

        if !matches_side(&walk_entry.sides[0]) && !matches_side(&walk_entry.sides[1]) {
            conflicts
                .entry(ConflictType::StaleFile)
                .or_default()
                .push(path.clone());
        }

        Ok(())
    }

    fn workdir_blob_oid(&self, path: &Path) -> anyhow::Result<ObjectId> {
        let blob = self.repository.workspace().parse_blob(path)?;
        blob.object_id(self.repository.database().kind())
    }

    /// Execute planned workdir mutations: deletes first, then writes
    ///
    /// The cancel token is consulted between mutations; aborting here leaves
    /// a partially updated working tree but an untouched index.
    fn apply_workdir(&self, actions: &[WorkdirAction]) -> anyhow::Result<()> {
        let workspace = self.repository.workspace();
        let mut pruned: BTreeSet<PathBuf> = BTreeSet::new();

        for action in actions {
            self.cancel.check()?;
            if let WorkdirAction::Delete { path } = action {
                workspace.remove_file(path)?;
                pruned.insert(path.clone());
            }
        }
        for path in pruned.iter().rev() {
            workspace.prune_empty_parents(path)?;
        }

        for action in actions {
            self.cancel.check()?;
            match action {
                WorkdirAction::Write { path, entry } => {
                    let blob = self
                        .repository
                        .database()
                        .parse_object_as_blob(&entry.oid)?
                        .with_context(|| format!("failed to load blob {}", entry.oid))?;
                    workspace.write_file(path, blob.content(), entry)?;
                }
                WorkdirAction::Chmod { path, entry } => {
                    workspace.set_mode(path, entry)?;
                }
                WorkdirAction::Delete { .. } => {}
            }
        }

        Ok(())
    }

    /// Apply resolutions to the in-memory index
    fn apply_index(
        &self,
        index: &mut Index,
        resolutions: Vec<(PathBuf, Resolution)>,
    ) -> anyhow::Result<()> {
        for (path, resolution) in resolutions {
            match resolution {
                Resolution::Take(Some(entry)) => {
                    let metadata = self
                        .repository
                        .workspace()
                        .stat_file(&path)
                        .unwrap_or_else(|_| EntryMetadata {
                            mode: entry.mode,
                            ..Default::default()
                        });
                    index.add(IndexEntry::from_parts(path, entry.oid, metadata))?;
                }
                Resolution::Take(None) => {
                    index.remove(path)?;
                }
                Resolution::Conflict([base, ours, theirs]) => {
                    index.stage_conflict(
                        &path,
                        base.map(|entry| (entry.oid, entry.mode)),
                        ours.map(|entry| (entry.oid, entry.mode)),
                        theirs.map(|entry| (entry.oid, entry.mode)),
                    )?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_id::DigestKind;

    fn entry(content: &[u8]) -> Option<DatabaseEntry> {
        Some(DatabaseEntry::new(
            DigestKind::Sha1.hash(content),
            EntryMode::File(FileMode::Regular),
        ))
    }

    #[test]
    fn test_all_sides_equal_keeps_entry() {
        let sides = [entry(b"same"), entry(b"same"), entry(b"same")];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Take(Some(taken)) if Some(taken.clone()) == sides[0]
        ));
    }

    #[test]
    fn test_only_b_changed_fast_forwards() {
        let sides = [entry(b"old"), entry(b"old"), entry(b"new")];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Take(Some(taken)) if Some(taken.clone()) == sides[2]
        ));
    }

    #[test]
    fn test_only_a_changed_keeps_a() {
        let sides = [entry(b"old"), entry(b"new"), entry(b"old")];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Take(Some(taken)) if Some(taken.clone()) == sides[1]
        ));
    }

    #[test]
    fn test_addition_only_in_b_introduces() {
        let sides = [None, None, entry(b"incoming")];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Take(Some(taken)) if Some(taken.clone()) == sides[2]
        ));
    }

    #[test]
    fn test_removed_on_both_sides_removes() {
        let sides = [entry(b"gone"), None, None];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Take(None)
        ));
    }

    #[test]
    fn test_all_three_differ_records_conflict() {
        let sides = [entry(b"base"), entry(b"ours"), entry(b"theirs")];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Conflict(_)
        ));
    }

    #[test]
    fn test_modify_delete_records_conflict() {
        let sides = [entry(b"base"), None, entry(b"theirs")];
        assert!(matches!(
            ReadTree::resolve_sides(&sides),
            Resolution::Conflict(_)
        ));
    }
}

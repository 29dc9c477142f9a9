//! Multi-tree walker
//!
//! Walks up to three trees (O = original HEAD, A = target, B = merge-from)
//! in canonical sorted order, flattening them into per-path triples of
//! optional entries. Subtrees are expanded recursively; a path that is a
//! file on one side and a directory on another yields both the file entry
//! and the expanded directory children.

use crate::areas::database::Database;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Number of tree sides in a walk (O, A, B)
pub const WALK_SIDES: usize = 3;

/// One path of a multi-tree walk with its per-side entries
#[derive(Debug, Clone)]
pub struct TreeWalkEntry {
    pub path: PathBuf,
    /// Entries in (O, A, B) order; None where the side lacks the path
    pub sides: [Option<DatabaseEntry>; WALK_SIDES],
}

/// Walk the given trees, producing file-level entries in sorted order
///
/// A `None` tree side behaves as an empty tree. The cancel token is
/// consulted once per emitted path.
pub fn walk_trees(
    database: &Database,
    trees: [Option<&ObjectId>; WALK_SIDES],
    cancel: &CancelToken,
) -> anyhow::Result<Vec<TreeWalkEntry>> {
    let mut output = Vec::new();
    walk_level(database, trees, Path::new(""), cancel, &mut output)?;
    Ok(output)
}

fn walk_level(
    database: &Database,
    trees: [Option<&ObjectId>; WALK_SIDES],
    prefix: &Path,
    cancel: &CancelToken,
    output: &mut Vec<TreeWalkEntry>,
) -> anyhow::Result<()> {
    let sides = trees
        .iter()
        .map(|oid| match oid {
            Some(oid) => database
                .parse_object_as_tree(oid)?
                .ok_or_else(|| anyhow::anyhow!("object {} is not a tree", oid))
                .map(Some),
            None => Ok(None),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut names = BTreeSet::new();
    for side in sides.iter().flatten() {
        for (name, _) in side.entries() {
            names.insert(name.to_string());
        }
    }

    for name in names {
        cancel.check()?;

        let path = prefix.join(&name);
        let entries: Vec<Option<DatabaseEntry>> = sides
            .iter()
            .map(|side| {
                side.as_ref()
                    .and_then(|tree| tree.get(&name))
                    .cloned()
            })
            .collect();

        let any_tree = entries
            .iter()
            .any(|entry| entry.as_ref().is_some_and(|e| e.is_tree()));

        if any_tree {
            // recurse into the directory sides
            let subtree_oids: Vec<Option<&ObjectId>> = entries
                .iter()
                .map(|entry| match entry {
                    Some(e) if e.is_tree() => Some(&e.oid),
                    _ => None,
                })
                .collect();
            walk_level(
                database,
                [subtree_oids[0], subtree_oids[1], subtree_oids[2]],
                &path,
                cancel,
                output,
            )?;

            // file entries at the same name surface alongside the subtree
            let file_sides: [Option<DatabaseEntry>; WALK_SIDES] = [
                entries[0].clone().filter(|e| !e.is_tree()),
                entries[1].clone().filter(|e| !e.is_tree()),
                entries[2].clone().filter(|e| !e.is_tree()),
            ];
            if file_sides.iter().any(|entry| entry.is_some()) {
                output.push(TreeWalkEntry {
                    path,
                    sides: file_sides,
                });
            }
        } else {
            output.push(TreeWalkEntry {
                path,
                sides: [
                    entries[0].clone(),
                    entries[1].clone(),
                    entries[2].clone(),
                ],
            });
        }
    }

    Ok(())
}

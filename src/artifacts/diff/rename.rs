//! Rename and copy detection
//!
//! Pairs unmatched additions with unmatched deletions by content
//! similarity. Exact digest matches pair first; the rest are scored with a
//! line-fingerprint overlap. Candidates are ordered by similarity, then by
//! source path, so detection is deterministic. Additions that exactly match
//! a surviving unchanged path are reported as copies.

use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::diff::tree_diff::{ContentLoader, DiffStatus, EntrySet, HashDiff};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;

/// Default minimum similarity (percent) for a rename pair
pub const DEFAULT_THRESHOLD: u8 = 50;

/// Weighted line-hash fingerprint of a content blob
///
/// Maps the hash of each line to the total byte weight it contributes.
fn fingerprint(content: &[u8]) -> HashMap<u64, usize> {
    let mut lines = HashMap::new();

    for line in content.split(|&byte| byte == b'\n') {
        let mut hasher = DefaultHasher::new();
        line.hash(&mut hasher);
        *lines.entry(hasher.finish()).or_insert(0) += line.len() + 1;
    }

    lines
}

/// Similarity of two blobs in percent, by common line weight
fn similarity(a: &[u8], b: &[u8]) -> u8 {
    if a.is_empty() && b.is_empty() {
        return 100;
    }

    let fingerprint_a = fingerprint(a);
    let fingerprint_b = fingerprint(b);

    let common: usize = fingerprint_a
        .iter()
        .filter_map(|(hash, weight_a)| {
            fingerprint_b
                .get(hash)
                .map(|weight_b| (*weight_a).min(*weight_b))
        })
        .sum();
    let larger = (a.len() + 1).max(b.len() + 1);

    ((common * 100) / larger).min(100) as u8
}

/// A scored rename candidate between one delete and one add
#[derive(Debug)]
struct Candidate {
    score: u8,
    deleted_index: usize,
    added_index: usize,
}

/// Rewrite matching add/delete pairs as renames, and exact duplicates of
/// surviving paths as copies
///
/// `old_set` is consulted for copy sources: a source qualifies only when it
/// is present on the old side and untouched by this diff.
pub fn detect_renames(
    diffs: &mut Vec<HashDiff>,
    old_set: &EntrySet,
    threshold: u8,
    old_content: ContentLoader,
    new_content: ContentLoader,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    let deleted: Vec<usize> = diffs
        .iter()
        .enumerate()
        .filter(|(_, diff)| diff.status == DiffStatus::Deleted)
        .map(|(index, _)| index)
        .collect();
    let added: Vec<usize> = diffs
        .iter()
        .enumerate()
        .filter(|(_, diff)| diff.status == DiffStatus::Added)
        .map(|(index, _)| index)
        .collect();

    if added.is_empty() {
        return Ok(());
    }

    let mut candidates = Vec::new();
    let mut content_cache: HashMap<usize, Bytes> = HashMap::new();

    for &deleted_index in &deleted {
        for &added_index in &added {
            cancel.check()?;

            let deleted_diff = &diffs[deleted_index];
            let added_diff = &diffs[added_index];

            // identical digests pair without reading content
            let score = if deleted_diff.old_oid == added_diff.new_oid {
                100
            } else {
                if !content_cache.contains_key(&deleted_index) {
                    let bytes = old_content(
                        &deleted_diff.path,
                        deleted_diff.old_oid.as_ref().expect("deleted has old oid"),
                    )?;
                    content_cache.insert(deleted_index, bytes);
                }
                if !content_cache.contains_key(&added_index) {
                    let bytes = new_content(
                        &added_diff.path,
                        added_diff.new_oid.as_ref().expect("added has new oid"),
                    )?;
                    content_cache.insert(added_index, bytes);
                }

                similarity(
                    &content_cache[&deleted_index],
                    &content_cache[&added_index],
                )
            };

            if score >= threshold {
                candidates.push(Candidate {
                    score,
                    deleted_index,
                    added_index,
                });
            }
        }
    }

    // highest similarity wins; ties break on the lexically first source path
    candidates.sort_by(|left, right| {
        right
            .score
            .cmp(&left.score)
            .then_with(|| diffs[left.deleted_index].path.cmp(&diffs[right.deleted_index].path))
            .then_with(|| diffs[left.added_index].path.cmp(&diffs[right.added_index].path))
    });

    let mut used_deleted = BTreeSet::new();
    let mut used_added = BTreeSet::new();
    let mut drop_indices = BTreeSet::new();

    for candidate in candidates {
        if used_deleted.contains(&candidate.deleted_index)
            || used_added.contains(&candidate.added_index)
        {
            continue;
        }
        used_deleted.insert(candidate.deleted_index);
        used_added.insert(candidate.added_index);

        let from = diffs[candidate.deleted_index].path.clone();
        let old_mode = diffs[candidate.deleted_index].old_mode;
        let old_oid = diffs[candidate.deleted_index].old_oid.clone();

        let renamed = &mut diffs[candidate.added_index];
        renamed.status = DiffStatus::Renamed {
            from,
            score: candidate.score,
        };
        renamed.old_mode = old_mode;
        renamed.old_oid = old_oid;

        drop_indices.insert(candidate.deleted_index);
    }

    // copies: exact matches of paths untouched by the diff
    let changed_paths: BTreeSet<PathBuf> =
        diffs.iter().map(|diff| diff.path.clone()).collect();
    for &added_index in &added {
        if used_added.contains(&added_index) {
            continue;
        }

        let added_oid = diffs[added_index].new_oid.clone();
        let source = old_set.iter().find(|(path, entry)| {
            Some(&entry.oid) == added_oid.as_ref() && !changed_paths.contains(*path)
        });

        if let Some((source_path, source_entry)) = source {
            let renamed = &mut diffs[added_index];
            renamed.status = DiffStatus::Copied {
                from: source_path.clone(),
            };
            renamed.old_mode = Some(source_entry.mode);
            renamed.old_oid = Some(source_entry.oid.clone());
        }
    }

    // remove consumed deletions, highest index first
    for index in drop_indices.into_iter().rev() {
        diffs.remove(index);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::database::database_entry::DatabaseEntry;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object_id::DigestKind;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_similarity_of_identical_content() {
        assert_eq!(similarity(b"a\nb\nc\n", b"a\nb\nc\n"), 100);
    }

    #[test]
    fn test_similarity_of_disjoint_content() {
        assert_eq!(similarity(b"entirely\ndifferent\n", b"nothing\nshared here\n"), 0);
    }

    #[test]
    fn test_similarity_of_partial_overlap() {
        let a = b"one\ntwo\nthree\nfour\n";
        let b = b"one\ntwo\nthree\nCHANGED\n";
        let score = similarity(a, b);

        assert!(score >= 50, "expected >= 50, got {}", score);
        assert!(score < 100);
    }

    fn diff_for(path: &str, status: DiffStatus, content: &[u8]) -> HashDiff {
        let oid = DigestKind::Sha1.hash(content);
        match status {
            DiffStatus::Added => HashDiff {
                path: PathBuf::from(path),
                old_mode: None,
                new_mode: Some(EntryMode::File(FileMode::Regular)),
                old_oid: None,
                new_oid: Some(oid),
                status,
            },
            DiffStatus::Deleted => HashDiff {
                path: PathBuf::from(path),
                old_mode: Some(EntryMode::File(FileMode::Regular)),
                new_mode: None,
                old_oid: Some(oid),
                new_oid: None,
                status,
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_exact_rename_detected_without_content() {
        let mut diffs = vec![
            diff_for("old_name.txt", DiffStatus::Deleted, b"same content\n"),
            diff_for("new_name.txt", DiffStatus::Added, b"same content\n"),
        ];

        let fails: ContentLoader = &|_, _| anyhow::bail!("content must not be read");
        detect_renames(
            &mut diffs,
            &EntrySet::new(),
            DEFAULT_THRESHOLD,
            fails,
            fails,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(diffs.len(), 1);
        assert_eq!(
            diffs[0].status,
            DiffStatus::Renamed {
                from: PathBuf::from("old_name.txt"),
                score: 100
            }
        );
    }

    #[test]
    fn test_similar_rename_scored_through_loader() {
        let old_body: Bytes = Bytes::from_static(b"alpha\nbeta\ngamma\ndelta\n");
        let new_body: Bytes = Bytes::from_static(b"alpha\nbeta\ngamma\nepsilon\n");

        let mut diffs = vec![
            diff_for("before.txt", DiffStatus::Deleted, &old_body),
            diff_for("after.txt", DiffStatus::Added, &new_body),
        ];

        let old_loader: ContentLoader = &|_, _| Ok(old_body.clone());
        let new_loader: ContentLoader = &|_, _| Ok(new_body.clone());
        detect_renames(
            &mut diffs,
            &EntrySet::new(),
            DEFAULT_THRESHOLD,
            old_loader,
            new_loader,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(diffs.len(), 1);
        assert!(matches!(
            &diffs[0].status,
            DiffStatus::Renamed { from, score } if from == Path::new("before.txt") && *score >= 50
        ));
    }

    #[test]
    fn test_dissimilar_pair_stays_add_and_delete() {
        let mut diffs = vec![
            diff_for("gone.txt", DiffStatus::Deleted, b"completely\nunrelated\n"),
            diff_for("fresh.txt", DiffStatus::Added, b"brand\nnew\nstuff\n"),
        ];

        let old_loader: ContentLoader = &|_, _| Ok(Bytes::from_static(b"completely\nunrelated\n"));
        let new_loader: ContentLoader = &|_, _| Ok(Bytes::from_static(b"brand\nnew\nstuff\n"));
        detect_renames(
            &mut diffs,
            &EntrySet::new(),
            DEFAULT_THRESHOLD,
            old_loader,
            new_loader,
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(diffs.len(), 2);
    }

    #[test]
    fn test_copy_detected_from_surviving_source() {
        let content = b"duplicated content\n";
        let oid = DigestKind::Sha1.hash(content);

        let mut old_set = EntrySet::new();
        old_set.insert(
            PathBuf::from("source.txt"),
            DatabaseEntry::new(oid, EntryMode::File(FileMode::Regular)),
        );

        let mut diffs = vec![diff_for("copy.txt", DiffStatus::Added, content)];

        let fails: ContentLoader = &|_, _| anyhow::bail!("content must not be read");
        detect_renames(
            &mut diffs,
            &old_set,
            DEFAULT_THRESHOLD,
            fails,
            fails,
            &CancelToken::new(),
        )
        .unwrap();

        assert!(matches!(
            &diffs[0].status,
            DiffStatus::Copied { from } if from == Path::new("source.txt")
        ));
    }
}

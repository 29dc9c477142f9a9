//! Commit graph traversal
//!
//! Walks history from a starting commit using an iterative work queue and an
//! explicit visited set: no recursion, no shared state, and cycle-safe even
//! against malformed parent pointers. Parents of each commit enter one
//! shared queue ordered by commit date descending (ties break on insertion
//! order), so sibling branches merge into a single date-ordered stream.

use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Commitish;
use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::{BinaryHeap, HashSet};

/// Queue entry ordered by (timestamp desc, insertion order asc)
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueEntry {
    timestamp: i64,
    sequence: usize,
    oid: ObjectId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // max-heap: newer commits first; earlier insertion wins ties
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Iterator over commits reachable from a starting point
pub struct RevList<'r> {
    repository: &'r Repository,
    cancel: CancelToken,
    queue: BinaryHeap<QueueEntry>,
    visited: HashSet<ObjectId>,
    sequence: usize,
}

impl<'r> RevList<'r> {
    /// Start a walk from a resolved revision
    pub fn new(
        repository: &'r Repository,
        start: &Commitish,
        cancel: CancelToken,
    ) -> anyhow::Result<Self> {
        let (oid, commit) = start.resolve_to_commit(repository)?;

        let mut rev_list = RevList {
            repository,
            cancel,
            queue: BinaryHeap::new(),
            visited: HashSet::new(),
            sequence: 0,
        };
        rev_list.push(oid, commit.timestamp().timestamp());

        Ok(rev_list)
    }

    fn push(&mut self, oid: ObjectId, timestamp: i64) {
        // the visited set guards the queue, so a commit reachable along
        // several paths is enqueued at most once
        if self.visited.insert(oid.clone()) {
            self.queue.push(QueueEntry {
                timestamp,
                sequence: self.sequence,
                oid,
            });
            self.sequence += 1;
        }
    }

    fn next_commit(&mut self) -> anyhow::Result<Option<(ObjectId, Commit)>> {
        self.cancel.check()?;

        let Some(entry) = self.queue.pop() else {
            return Ok(None);
        };

        let commit = self
            .repository
            .database()
            .parse_object_as_commit(&entry.oid)?
            .ok_or_else(|| anyhow::anyhow!("object {} is not a commit", entry.oid))?;

        let parents: Vec<ObjectId> = commit.parents().to_vec();
        for parent in parents {
            let timestamp = self
                .repository
                .database()
                .parse_object_as_commit(&parent)?
                .map(|parent_commit| parent_commit.timestamp().timestamp())
                .unwrap_or_default();
            self.push(parent, timestamp);
        }

        Ok(Some((entry.oid, commit)))
    }
}

impl Iterator for RevList<'_> {
    type Item = anyhow::Result<(ObjectId, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_commit().transpose()
    }
}

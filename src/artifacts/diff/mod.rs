//! Diff engine
//!
//! This module implements diffing across any two of {tree, index, worktree}:
//!
//! - `diff_algorithm`: Myers' shortest-edit-script diff and hunk grouping
//! - `diff_target`: one side of a content diff (path, digest, mode, bytes)
//! - `tree_diff`: entry-set comparison producing `HashDiff` records
//! - `rename`: similarity-based rename and copy detection
//! - `unified`: unified-diff text output over a pair of targets

pub mod diff_algorithm;
pub mod diff_target;
pub mod rename;
pub mod tree_diff;
pub mod unified;

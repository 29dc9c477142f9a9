//! Tree walking and read-tree
//!
//! The engine behind checkout and fast-forward merge:
//!
//! - `tree_walk`: walk up to three trees in canonical order, producing
//!   per-path entry triples
//! - `read_tree`: the three-way merge policy over a walk, planning and
//!   applying index and working tree updates
//! - `conflict`: conflict classification and user-facing messages

pub mod conflict;
pub mod read_tree;
pub mod tree_walk;

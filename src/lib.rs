//! A Git-compatible version control core.
//!
//! The crate is split into three layers:
//!
//! - `areas`: the places a repository keeps state (object database, index,
//!   refs, workspace) and the `Repository` facade that coordinates them
//! - `artifacts`: the data structures and algorithms (objects, packs,
//!   revisions, tree walking, diffing, patching, history traversal)
//! - `commands`: the porcelain commands built on top of the engine

pub mod areas;
pub mod artifacts;
pub mod commands;

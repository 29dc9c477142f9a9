//! Command implementations
//!
//! User-facing porcelain commands, each implemented as a method on
//! `Repository` so they compose the engine pieces (database, index, refs,
//! workspace) without owning any state of their own.

pub mod porcelain;

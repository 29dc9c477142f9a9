//! Index file format
//!
//! The index (also called staging area or cache) stores information about
//! the working tree. It tracks which files should be included in the next
//! commit, including unresolved merge stages.
//!
//! ## File Format
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2, 3 or 4 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Sorted by (path, stage)
//!   - Padded to 8-byte alignment in versions 2 and 3
//!   - Version 4 compresses paths against the previous entry
//!
//! Extensions (optional):
//!   - 4-byte tag + u32 length + payload; "TREE" is the cache tree
//!
//! Checksum:
//!   - Digest of all preceding bytes terminates the file
//! ```

pub mod cache_tree;
pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12; // 4 bytes for marker, 4 for version, 4 for entries_count

/// Magic signature identifying index files
pub const SIGNATURE: &str = "DIRC";

/// Default index file format version for new repositories
pub const DEFAULT_VERSION: u32 = 2;

/// Index versions the reader accepts
pub const SUPPORTED_VERSIONS: [u32; 3] = [2, 3, 4];

/// Tag of the cache-tree extension
pub const CACHE_TREE_TAG: &str = "TREE";

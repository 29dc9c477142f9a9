//! Core object traits and types
//!
//! This module defines the fundamental traits that all objects implement:
//! - `Packable`: Serialization to the on-disk binary format
//! - `Unpackable`: Deserialization from the on-disk binary format
//! - `Object`: Common object operations (ID computation, display)
//!
//! ## Object Format
//!
//! All objects are framed as:
//! ```text
//! <type> <size>\0<content>
//! ```
//! then compressed with zlib and stored under `objects/`.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use std::io::BufRead;
use std::path::PathBuf;

/// Trait for serializing objects to the binary format
pub trait Packable {
    /// Serialize the object to bytes (including the frame header)
    fn serialize(&self) -> Result<Bytes>;
}

/// Trait for deserializing objects from the binary format
pub trait Unpackable {
    /// Deserialize the object from a reader (header already consumed)
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

/// Core object trait
///
/// Implemented by all object types (Blob, Tree, Commit, Tag).
/// Provides common operations like ID computation and display.
pub trait Object: Packable {
    /// Get the object's type
    fn object_type(&self) -> ObjectType;

    /// Get a human-readable representation
    fn display(&self) -> String;

    /// Compute the object ID for the given digest variant
    ///
    /// The ID is the digest of the serialized frame, so it is stable across
    /// runs and independent of in-memory representation.
    fn object_id(&self, kind: DigestKind) -> Result<ObjectId> {
        let content = self.serialize()?;
        Ok(kind.hash(&content))
    }

    /// Get the file system path where this object would be stored
    fn object_path(&self, kind: DigestKind) -> Result<PathBuf> {
        Ok(self.object_id(kind)?.to_path())
    }
}

/// Type-erased object container
///
/// Used when the specific object type isn't known at compile time.
/// Allows returning different object types from a single function.
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

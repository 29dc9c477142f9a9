//! Cache-tree index extension
//!
//! The `TREE` extension caches the digests of subtrees that were already
//! written to the object database, so building a tree from an unchanged
//! index is a lookup instead of a full rehash. A node is invalidated by
//! setting its entry count to -1 whenever a path under it changes.
//!
//! ## Format
//!
//! Depth-first sequence of nodes:
//!
//! ```text
//! <component-name>\0<entry-count> <subtree-count>\n[<raw-digest>]
//! ```
//!
//! The root node has an empty component name; the digest is present only
//! when the entry count is non-negative (the node is valid).

use crate::artifacts::core::error::EngineError;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use std::path::Path;

/// One node of the cache tree, covering a directory of the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTree {
    /// Path component of this node ("" for the root)
    pub name: String,
    /// Number of index entries covered, or -1 when invalidated
    pub entry_count: i64,
    /// Digest of the corresponding tree object, when valid
    pub oid: Option<ObjectId>,
    /// Subdirectory nodes
    pub children: Vec<CacheTree>,
}

impl CacheTree {
    pub fn invalid_root() -> Self {
        CacheTree {
            name: String::new(),
            entry_count: -1,
            oid: None,
            children: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.entry_count >= 0 && self.oid.is_some()
    }

    /// Parse the extension payload
    pub fn parse(data: &[u8], kind: DigestKind) -> anyhow::Result<Self> {
        let mut pos = 0;
        let root = Self::parse_node(data, &mut pos, kind)?;

        Ok(root)
    }

    fn parse_node(data: &[u8], pos: &mut usize, kind: DigestKind) -> anyhow::Result<Self> {
        let name_end = data[*pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| EngineError::Corrupt("unterminated cache-tree name".to_string()))?;
        let name = std::str::from_utf8(&data[*pos..*pos + name_end])
            .map_err(|_| EngineError::Corrupt("cache-tree name is not UTF-8".to_string()))?
            .to_string();
        *pos += name_end + 1;

        let line_end = data[*pos..]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| EngineError::Corrupt("unterminated cache-tree counts".to_string()))?;
        let line = std::str::from_utf8(&data[*pos..*pos + line_end])
            .map_err(|_| EngineError::Corrupt("cache-tree counts are not ASCII".to_string()))?;
        *pos += line_end + 1;

        let (entry_count, subtree_count) = line
            .split_once(' ')
            .and_then(|(entries, subtrees)| {
                Some((
                    entries.parse::<i64>().ok()?,
                    subtrees.parse::<usize>().ok()?,
                ))
            })
            .ok_or_else(|| EngineError::Corrupt("bad cache-tree counts".to_string()))?;

        let oid = if entry_count >= 0 {
            let raw = data
                .get(*pos..*pos + kind.raw_len())
                .ok_or_else(|| EngineError::Corrupt("truncated cache-tree digest".to_string()))?;
            *pos += kind.raw_len();
            Some(ObjectId::from_raw(raw)?)
        } else {
            None
        };

        let mut children = Vec::with_capacity(subtree_count);
        for _ in 0..subtree_count {
            children.push(Self::parse_node(data, pos, kind)?);
        }

        Ok(CacheTree {
            name,
            entry_count,
            oid,
            children,
        })
    }

    /// Serialize the extension payload
    pub fn serialize(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(self.name.as_bytes());
        buffer.push(0);
        buffer.extend_from_slice(
            format!("{} {}\n", self.entry_count, self.children.len()).as_bytes(),
        );
        if let Some(oid) = &self.oid
            && self.entry_count >= 0
        {
            buffer.extend_from_slice(&oid.to_raw());
        }

        for child in &self.children {
            child.serialize(buffer);
        }
    }

    /// Invalidate every node along the path to a changed entry
    pub fn invalidate(&mut self, path: &Path) {
        self.entry_count = -1;
        self.oid = None;

        let mut components = path.components();
        let Some(first) = components.next() else {
            return;
        };
        let first = first.as_os_str().to_string_lossy();

        if let Some(child) = self
            .children
            .iter_mut()
            .find(|child| child.name == first)
        {
            child.invalidate(components.as_path());
        }
    }

    /// Find the node covering a directory path, if any
    pub fn node_for(&self, path: &Path) -> Option<&CacheTree> {
        let mut components = path.components();
        let Some(first) = components.next() else {
            return Some(self);
        };
        let first = first.as_os_str().to_string_lossy();

        self.children
            .iter()
            .find(|child| child.name == first)?
            .node_for(components.as_path())
    }
}

//! Pack index (`.idx`) decoding, version 2
//!
//! The index maps object digests to byte offsets in the companion pack.
//! Layout:
//!
//! ```text
//! \377tOc            magic
//! u32 = 2            version
//! 256 x u32          fanout: cumulative object counts per first digest byte
//! N x digest         sorted digest table
//! N x u32            CRC32 of the compressed entry (unused by the reader)
//! N x u32            offsets; high bit set = index into the large table
//! M x u64            large offsets (packs over 2 GiB)
//! digest             pack trailer digest
//! digest             index self-digest
//! ```

use crate::artifacts::core::error::EngineError;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use crate::artifacts::pack::{PACK_INDEX_SIGNATURE, PACK_VERSION};
use anyhow::Context;
use byteorder::{BigEndian, ByteOrder};
use std::path::Path;

/// Bit marking an offset as an index into the large-offset table
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Parsed pack index
#[derive(Debug)]
pub struct PackIndex {
    fanout: [u32; 256],
    oids: Vec<ObjectId>,
    offsets: Vec<u32>,
    large_offsets: Vec<u64>,
}

impl PackIndex {
    pub fn load(path: &Path, kind: DigestKind) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read pack index {:?}", path))?;
        Self::parse(&data, kind)
            .with_context(|| format!("failed to parse pack index {:?}", path))
    }

    pub fn parse(data: &[u8], kind: DigestKind) -> anyhow::Result<Self> {
        let digest_len = kind.raw_len();

        if data.len() < 8 + 256 * 4 + 2 * digest_len {
            return Err(EngineError::Corrupt("pack index too small".to_string()).into());
        }
        if &data[0..4] != PACK_INDEX_SIGNATURE {
            return Err(EngineError::Corrupt("bad pack index magic".to_string()).into());
        }
        let version = BigEndian::read_u32(&data[4..8]);
        if version != PACK_VERSION {
            return Err(EngineError::Corrupt(format!(
                "unsupported pack index version {}",
                version
            ))
            .into());
        }

        let mut fanout = [0u32; 256];
        for (slot, chunk) in fanout.iter_mut().zip(data[8..8 + 256 * 4].chunks_exact(4)) {
            *slot = BigEndian::read_u32(chunk);
        }
        let count = fanout[255] as usize;

        let oids_start = 8 + 256 * 4;
        let crcs_start = oids_start + count * digest_len;
        let offsets_start = crcs_start + count * 4;
        let large_start = offsets_start + count * 4;
        let trailer_len = 2 * digest_len;

        if data.len() < large_start + trailer_len {
            return Err(EngineError::Corrupt("truncated pack index".to_string()).into());
        }

        let mut oids = Vec::with_capacity(count);
        for chunk in data[oids_start..crcs_start].chunks_exact(digest_len) {
            oids.push(ObjectId::from_raw(chunk)?);
        }

        let mut offsets = Vec::with_capacity(count);
        for chunk in data[offsets_start..large_start].chunks_exact(4) {
            offsets.push(BigEndian::read_u32(chunk));
        }

        let large_table = &data[large_start..data.len() - trailer_len];
        let mut large_offsets = Vec::with_capacity(large_table.len() / 8);
        for chunk in large_table.chunks_exact(8) {
            large_offsets.push(BigEndian::read_u64(chunk));
        }

        Ok(PackIndex {
            fanout,
            oids,
            offsets,
            large_offsets,
        })
    }

    pub fn len(&self) -> usize {
        self.oids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oids.is_empty()
    }

    /// Look up the pack offset of an object
    ///
    /// The fanout bounds the binary search to digests sharing the first
    /// byte.
    pub fn lookup(&self, oid: &ObjectId) -> anyhow::Result<Option<u64>> {
        let raw = oid.to_raw();
        let first = raw[0] as usize;

        let low = if first == 0 {
            0
        } else {
            self.fanout[first - 1] as usize
        };
        let high = self.fanout[first] as usize;

        match self.oids[low..high].binary_search(oid) {
            Ok(position) => Ok(Some(self.offset_at(low + position)?)),
            Err(_) => Ok(None),
        }
    }

    fn offset_at(&self, position: usize) -> anyhow::Result<u64> {
        let raw = self.offsets[position];

        if raw & LARGE_OFFSET_FLAG == 0 {
            return Ok(raw as u64);
        }

        let large_index = (raw & !LARGE_OFFSET_FLAG) as usize;
        self.large_offsets
            .get(large_index)
            .copied()
            .ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "large offset index {} out of range",
                    large_index
                ))
                .into()
            })
    }

    /// All digests starting with the given hex prefix, for disambiguation
    pub fn oids_with_prefix(&self, prefix: &str) -> Vec<ObjectId> {
        self.oids
            .iter()
            .filter(|oid| oid.as_ref().starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn oids(&self) -> &[ObjectId] {
        &self.oids
    }
}

//! Pack file decoding, version 2
//!
//! A pack is `PACK` + version + object count, followed by the entries, and
//! closed with a digest of everything before it. Entries are either direct
//! (zlib stream of the payload) or deltas against a base named by relative
//! offset (`OFS_DELTA`) or digest (`REF_DELTA`).
//!
//! Base objects are resolved recursively; intermediate bases are cached by
//! offset for the duration of one read so long delta chains stay linear.

use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::core::error::EngineError;
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::pack_index::PackIndex;
use crate::artifacts::pack::{
    PACK_SIGNATURE, PACK_TYPE_BLOB, PACK_TYPE_COMMIT, PACK_TYPE_OFS_DELTA, PACK_TYPE_REF_DELTA,
    PACK_TYPE_TAG, PACK_TYPE_TREE, PACK_VERSION, delta, varint,
};
use anyhow::Context;
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::trace;

/// An opened pack with its companion index
#[derive(Debug)]
pub struct PackReader {
    path: PathBuf,
    kind: DigestKind,
    data: Bytes,
    index: PackIndex,
}

/// Per-read cache of materialized bases, keyed by pack offset
type BaseCache = HashMap<u64, (ObjectType, Bytes)>;

impl PackReader {
    /// Open `pack-<digest>.pack` and its `.idx` next to it
    pub fn open(pack_path: &Path, kind: DigestKind) -> anyhow::Result<Self> {
        let data = std::fs::read(pack_path)
            .with_context(|| format!("failed to read pack {:?}", pack_path))?;

        let digest_len = kind.raw_len();
        if data.len() < 12 + digest_len {
            return Err(EngineError::Corrupt("pack file too small".to_string()).into());
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(EngineError::Corrupt("bad pack magic".to_string()).into());
        }
        let version = BigEndian::read_u32(&data[4..8]);
        if version != PACK_VERSION {
            return Err(
                EngineError::Corrupt(format!("unsupported pack version {}", version)).into(),
            );
        }

        let trailer_start = data.len() - digest_len;
        let expected = kind.hash(&data[..trailer_start]);
        let actual = ObjectId::from_raw(&data[trailer_start..])?;
        if expected != actual {
            return Err(EngineError::Corrupt(format!(
                "pack trailer digest mismatch in {:?}",
                pack_path
            ))
            .into());
        }

        let index_path = pack_path.with_extension("idx");
        let index = PackIndex::load(&index_path, kind)?;

        trace!(pack = ?pack_path, objects = index.len(), "opened pack");

        Ok(PackReader {
            path: pack_path.to_path_buf(),
            kind,
            data: Bytes::from(data),
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// True when the companion index knows this digest
    pub fn contains(&self, oid: &ObjectId) -> bool {
        matches!(self.index.lookup(oid), Ok(Some(_)))
    }

    /// Read an object by digest, materializing delta chains
    pub fn read(
        &self,
        oid: &ObjectId,
        cancel: &CancelToken,
    ) -> anyhow::Result<Option<(ObjectType, Bytes)>> {
        let Some(offset) = self.index.lookup(oid)? else {
            return Ok(None);
        };

        let mut cache = BaseCache::new();
        let (object_type, bytes) = self.read_at(offset, &mut cache, cancel)?;

        Ok(Some((object_type, bytes)))
    }

    /// Decode the entry at a byte offset
    fn read_at(
        &self,
        offset: u64,
        cache: &mut BaseCache,
        cancel: &CancelToken,
    ) -> anyhow::Result<(ObjectType, Bytes)> {
        cancel.check()?;

        if let Some(cached) = cache.get(&offset) {
            return Ok(cached.clone());
        }

        let entry = self
            .data
            .get(offset as usize..)
            .ok_or_else(|| EngineError::Corrupt(format!("pack offset {} out of range", offset)))?;
        let (entry_type, size, header_len) = varint::read_entry_header(entry)?;
        let mut pos = header_len;

        let result = match entry_type {
            PACK_TYPE_COMMIT | PACK_TYPE_TREE | PACK_TYPE_BLOB | PACK_TYPE_TAG => {
                let payload = self.inflate(&entry[pos..], size)?;
                (Self::object_type_of(entry_type)?, payload)
            }
            PACK_TYPE_OFS_DELTA => {
                let (relative, consumed) = varint::read_ofs_delta_offset(&entry[pos..])?;
                pos += consumed;

                let base_offset = offset.checked_sub(relative).ok_or_else(|| {
                    EngineError::Corrupt(format!(
                        "ofs-delta at {} points before the pack start",
                        offset
                    ))
                })?;

                let (base_type, base) = self.read_at(base_offset, cache, cancel)?;
                let delta_bytes = self.inflate(&entry[pos..], size)?;
                (base_type, delta::apply_delta(&base, &delta_bytes)?)
            }
            PACK_TYPE_REF_DELTA => {
                let raw_len = self.kind.raw_len();
                let base_oid = ObjectId::from_raw(
                    entry
                        .get(pos..pos + raw_len)
                        .ok_or_else(|| EngineError::Corrupt("truncated ref-delta".to_string()))?,
                )?;
                pos += raw_len;

                let base_offset = self.index.lookup(&base_oid)?.ok_or_else(|| {
                    EngineError::NotFound(format!("ref-delta base {}", base_oid))
                })?;

                let (base_type, base) = self.read_at(base_offset, cache, cancel)?;
                let delta_bytes = self.inflate(&entry[pos..], size)?;
                (base_type, delta::apply_delta(&base, &delta_bytes)?)
            }
            other => {
                return Err(EngineError::Corrupt(format!(
                    "unknown pack entry type {} at offset {}",
                    other, offset
                ))
                .into());
            }
        };

        cache.insert(offset, result.clone());
        Ok(result)
    }

    /// Inflate one zlib stream, verifying the advertised size
    fn inflate(&self, compressed: &[u8], expected_size: u64) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(compressed);
        let mut inflated = Vec::with_capacity(expected_size as usize);
        decoder
            .read_to_end(&mut inflated)
            .map_err(|err| EngineError::Corrupt(format!("bad zlib stream in pack: {}", err)))?;

        if inflated.len() as u64 != expected_size {
            return Err(EngineError::Corrupt(format!(
                "pack entry size mismatch: expected {}, inflated {}",
                expected_size,
                inflated.len()
            ))
            .into());
        }

        Ok(Bytes::from(inflated))
    }

    fn object_type_of(entry_type: u8) -> anyhow::Result<ObjectType> {
        match entry_type {
            PACK_TYPE_COMMIT => Ok(ObjectType::Commit),
            PACK_TYPE_TREE => Ok(ObjectType::Tree),
            PACK_TYPE_BLOB => Ok(ObjectType::Blob),
            PACK_TYPE_TAG => Ok(ObjectType::Tag),
            other => {
                Err(EngineError::Corrupt(format!("unknown pack object type {}", other)).into())
            }
        }
    }
}

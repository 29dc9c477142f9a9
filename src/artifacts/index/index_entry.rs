//! Index entry representation
//!
//! Each entry in the index represents a tracked file with:
//! - File path and merge stage
//! - Content hash (object ID)
//! - File metadata (mode, size, timestamps)
//!
//! ## Entry Format
//!
//! Versions 2 and 3 store entries padded to 8-byte alignment. Version 3 adds
//! an extended flag word. Version 4 drops the padding and compresses each
//! path against the previous one: a varint strip count followed by the
//! suffix, NUL-terminated.
//!
//! The flags word encodes the assume-valid bit, the extended bit, the merge
//! stage (0 merged, 1 base, 2 ours, 3 theirs) and the low bits of the path
//! length.

use crate::artifacts::core::error::EngineError;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use bytes::Bytes;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Maximum path length representable in the flags word
const MAX_PATH_SIZE: usize = 0xFFF;

/// Block size for entry alignment in versions 2 and 3
pub const ENTRY_BLOCK: usize = 8;

/// Flag bits
const FLAG_ASSUME_VALID: u16 = 0x8000;
const FLAG_EXTENDED: u16 = 0x4000;
const FLAG_STAGE_MASK: u16 = 0x3000;
const FLAG_STAGE_SHIFT: u16 = 12;

/// Merge stage of the entry at stage 0 (fully merged)
pub const STAGE_MERGED: u8 = 0;
/// Merge base stage in a conflict
pub const STAGE_BASE: u8 = 1;
/// "Ours" stage in a conflict
pub const STAGE_OURS: u8 = 2;
/// "Theirs" stage in a conflict
pub const STAGE_THEIRS: u8 = 3;

/// Index entry representing a tracked file at a merge stage
#[derive(Debug, Clone)]
pub struct IndexEntry {
    /// File path relative to repository root
    pub name: PathBuf,
    /// Digest of the file content
    pub oid: ObjectId,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
    /// Merge stage (0 = merged, 1-3 = conflict stages)
    pub stage: u8,
    /// Assume-unchanged bit
    pub assume_valid: bool,
    /// Raw extended flag word (version 3+), preserved verbatim
    pub extended_flags: u16,
}

impl IndexEntry {
    /// Build a merged (stage 0) entry
    pub fn from_parts(name: PathBuf, oid: ObjectId, metadata: EntryMetadata) -> Self {
        IndexEntry {
            name,
            oid,
            metadata,
            stage: STAGE_MERGED,
            assume_valid: false,
            extended_flags: 0,
        }
    }

    /// Build an entry at a specific conflict stage
    pub fn at_stage(name: PathBuf, oid: ObjectId, metadata: EntryMetadata, stage: u8) -> Self {
        IndexEntry {
            stage,
            ..Self::from_parts(name, oid, metadata)
        }
    }

    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name"))
    }

    /// Parent directories from outermost to innermost, excluding the root
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = self
            .name
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect();
        dirs.reverse();
        dirs
    }

    pub fn path_str(&self) -> anyhow::Result<&str> {
        self.name
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid entry name"))
    }

    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }

    fn flags(&self) -> u16 {
        let name_len = self
            .name
            .to_str()
            .map(|name| name.len())
            .unwrap_or(MAX_PATH_SIZE);

        let mut flags = min(name_len, MAX_PATH_SIZE) as u16;
        flags |= ((self.stage as u16) << FLAG_STAGE_SHIFT) & FLAG_STAGE_MASK;
        if self.assume_valid {
            flags |= FLAG_ASSUME_VALID;
        }
        if self.extended_flags != 0 {
            flags |= FLAG_EXTENDED;
        }

        flags
    }

    /// Serialize for the given index version
    ///
    /// `prev_path` feeds version 4's prefix compression and is ignored by
    /// versions 2 and 3.
    pub fn serialize(&self, version: u32, prev_path: &str) -> anyhow::Result<Bytes> {
        let entry_name = self.path_str()?;

        let mut entry_bytes = Vec::new();
        entry_bytes.write_u32::<BigEndian>(self.metadata.ctime as u32)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.ctime_nsec as u32)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.mtime as u32)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.mtime_nsec as u32)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.dev as u32)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.ino as u32)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<BigEndian>(self.metadata.size as u32)?;
        self.oid.write_raw_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<BigEndian>(self.flags())?;
        if version >= 3 && self.extended_flags != 0 {
            entry_bytes.write_u16::<BigEndian>(self.extended_flags)?;
        }

        if version == 4 {
            // strip count against the previous path, then the new suffix
            let common = common_prefix_len(prev_path, entry_name);
            let strip = prev_path.len() - common;
            write_offset_varint(&mut entry_bytes, strip as u64);
            entry_bytes.extend_from_slice(entry_name[common..].as_bytes());
            entry_bytes.push(0);
        } else {
            entry_bytes.extend_from_slice(entry_name.as_bytes());

            // pad to ENTRY_BLOCK with at least one NUL terminator
            entry_bytes.push(0);
            while entry_bytes.len() % ENTRY_BLOCK != 0 {
                entry_bytes.push(0);
            }
        }

        Ok(Bytes::from(entry_bytes))
    }

    /// Parse one entry, returning it and the number of bytes consumed
    pub fn deserialize(
        data: &[u8],
        kind: DigestKind,
        version: u32,
        prev_path: &str,
    ) -> anyhow::Result<(Self, usize)> {
        let digest_len = kind.raw_len();
        let fixed_len = 40 + digest_len + 2;

        if data.len() < fixed_len {
            return Err(EngineError::Corrupt("index entry truncated".to_string()).into());
        }

        let ctime = BigEndian::read_u32(&data[0..4]) as i64;
        let ctime_nsec = BigEndian::read_u32(&data[4..8]) as i64;
        let mtime = BigEndian::read_u32(&data[8..12]) as i64;
        let mtime_nsec = BigEndian::read_u32(&data[12..16]) as i64;
        let dev = BigEndian::read_u32(&data[16..20]) as u64;
        let ino = BigEndian::read_u32(&data[20..24]) as u64;
        let mode = EntryMode::try_from(BigEndian::read_u32(&data[24..28]))?;
        let uid = BigEndian::read_u32(&data[28..32]);
        let gid = BigEndian::read_u32(&data[32..36]);
        let size = BigEndian::read_u32(&data[36..40]) as u64;
        let oid = ObjectId::from_raw(&data[40..40 + digest_len])?;
        let flags = BigEndian::read_u16(&data[40 + digest_len..fixed_len]);

        let assume_valid = flags & FLAG_ASSUME_VALID != 0;
        let stage = ((flags & FLAG_STAGE_MASK) >> FLAG_STAGE_SHIFT) as u8;
        let name_len = (flags & MAX_PATH_SIZE as u16) as usize;

        let mut pos = fixed_len;
        let mut extended_flags = 0u16;
        if flags & FLAG_EXTENDED != 0 {
            if version < 3 {
                return Err(
                    EngineError::Corrupt("extended flags in a version 2 index".to_string()).into(),
                );
            }
            extended_flags = BigEndian::read_u16(
                data.get(pos..pos + 2)
                    .ok_or_else(|| EngineError::Corrupt("index entry truncated".to_string()))?,
            );
            pos += 2;
        }

        let (name, consumed) = if version == 4 {
            let (strip, varint_len) = read_offset_varint(&data[pos..])?;
            pos += varint_len;

            let suffix_end = data[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| EngineError::Corrupt("unterminated index path".to_string()))?;
            let suffix = std::str::from_utf8(&data[pos..pos + suffix_end])
                .map_err(|_| EngineError::Corrupt("index path is not UTF-8".to_string()))?;

            let keep = prev_path
                .len()
                .checked_sub(strip as usize)
                .ok_or_else(|| EngineError::Corrupt("bad path strip count".to_string()))?;
            let name = format!("{}{}", &prev_path[..keep], suffix);

            (name, pos + suffix_end + 1)
        } else {
            let name_end = if name_len < MAX_PATH_SIZE {
                pos + name_len
            } else {
                pos + data[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| EngineError::Corrupt("unterminated index path".to_string()))?
            };
            let name = std::str::from_utf8(
                data.get(pos..name_end)
                    .ok_or_else(|| EngineError::Corrupt("index entry truncated".to_string()))?,
            )
            .map_err(|_| EngineError::Corrupt("index path is not UTF-8".to_string()))?
            .to_string();

            // entries are padded to 8-byte alignment with at least one NUL
            let consumed = (name_end / ENTRY_BLOCK + 1) * ENTRY_BLOCK;
            if consumed > data.len() {
                return Err(EngineError::Corrupt("index entry truncated".to_string()).into());
            }

            (name, consumed)
        };

        let entry = IndexEntry {
            name: PathBuf::from(name),
            oid,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
            stage,
            assume_valid,
            extended_flags,
        };

        Ok((entry, consumed))
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.stage == other.stage
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then(self.stage.cmp(&other.stage))
    }
}

/// File metadata stored in index entries
///
/// Contains both file status information (mode, size, inode) and timestamps.
/// Comparing stat information lets change detection skip reading content.
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    /// Change time (seconds since Unix epoch)
    pub ctime: i64,
    /// Change time nanoseconds
    pub ctime_nsec: i64,
    /// Modification time (seconds since Unix epoch)
    pub mtime: i64,
    /// Modification time nanoseconds
    pub mtime_nsec: i64,
    /// Device ID
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// File mode (permissions and type)
    pub mode: EntryMode,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// File size in bytes
    pub size: u64,
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        use std::os::unix::prelude::MetadataExt;

        let mode = if metadata.is_dir() {
            EntryMode::Directory
        } else if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else {
            match file_path.is_executable() {
                true => EntryMode::File(FileMode::Executable),
                false => EntryMode::File(FileMode::Regular),
            }
        };

        Ok(Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        })
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Write the big-endian biased varint used by version 4 paths
fn write_offset_varint(buffer: &mut Vec<u8>, mut value: u64) {
    let mut stack = vec![(value & 0x7F) as u8];
    while value >= 0x80 {
        value = (value >> 7) - 1;
        stack.push(((value & 0x7F) as u8) | 0x80);
    }
    while let Some(byte) = stack.pop() {
        buffer.push(byte);
    }
}

/// Read the big-endian biased varint used by version 4 paths
fn read_offset_varint(data: &[u8]) -> anyhow::Result<(u64, usize)> {
    crate::artifacts::pack::varint::read_ofs_delta_offset(data)
}

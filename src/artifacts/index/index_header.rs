use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, SUPPORTED_VERSIONS};
use crate::artifacts::core::error::EngineError;
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use bytes::Bytes;

/// Index file header: signature, version, and entry count
#[derive(Debug, Clone)]
pub struct IndexHeader {
    pub marker: String,
    pub version: u32,
    pub entries_count: u32,
}

impl IndexHeader {
    pub fn new(version: u32, entries_count: u32) -> Self {
        IndexHeader {
            marker: SIGNATURE.to_string(),
            version,
            entries_count,
        }
    }

    pub fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(self.marker.as_bytes());
        bytes.write_u32::<BigEndian>(self.version)?;
        bytes.write_u32::<BigEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }

    pub fn deserialize(data: &[u8]) -> anyhow::Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(EngineError::Corrupt("index header truncated".to_string()).into());
        }

        let marker = std::str::from_utf8(&data[0..4])
            .map_err(|_| EngineError::Corrupt("index signature not ASCII".to_string()))?
            .to_string();
        if marker != SIGNATURE {
            return Err(EngineError::Corrupt("invalid index file signature".to_string()).into());
        }

        let version = BigEndian::read_u32(&data[4..8]);
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(EngineError::Corrupt(format!(
                "unsupported index file version: {}",
                version
            ))
            .into());
        }

        let entries_count = BigEndian::read_u32(&data[8..12]);

        Ok(IndexHeader {
            marker,
            version,
            entries_count,
        })
    }
}

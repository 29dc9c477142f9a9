//! Object identifiers and digest variants
//!
//! Object IDs are lowercase hexadecimal digests identifying all objects in
//! the repository. Two digest variants exist: the legacy 20-byte variant
//! (40 hex characters, SHA-1) and the modern 32-byte variant (64 hex
//! characters, SHA-256). A repository declares one variant at creation and
//! the store operates generically over it.
//!
//! ## Storage
//!
//! Objects are stored in `objects/<first-2-chars>/<remaining-chars>`

use sha1::Digest;
use std::io;
use std::path::PathBuf;

/// Digest variant of a repository
///
/// Selected at repository creation via `extensions.objectformat` in the
/// config file; `Sha1` is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestKind {
    #[default]
    Sha1,
    Sha256,
}

impl DigestKind {
    /// Length of the digest in raw bytes (20 or 32)
    pub fn raw_len(&self) -> usize {
        match self {
            DigestKind::Sha1 => 20,
            DigestKind::Sha256 => 32,
        }
    }

    /// Length of the digest in hex characters (40 or 64)
    pub fn hex_len(&self) -> usize {
        self.raw_len() * 2
    }

    /// Hash arbitrary bytes into an object ID of this variant
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let hex = match self {
            DigestKind::Sha1 => {
                let mut hasher = sha1::Sha1::new();
                hasher.update(data);
                format!("{:x}", hasher.finalize())
            }
            DigestKind::Sha256 => {
                let mut hasher = sha2::Sha256::new();
                hasher.update(data);
                format!("{:x}", hasher.finalize())
            }
        };

        ObjectId(hex)
    }

    /// The all-zero digest used for absent sides in diffs and reflogs
    pub fn null_oid(&self) -> ObjectId {
        ObjectId("0".repeat(self.hex_len()))
    }

    pub fn config_value(&self) -> &'static str {
        match self {
            DigestKind::Sha1 => "sha1",
            DigestKind::Sha256 => "sha256",
        }
    }

    pub fn try_parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "sha1" => Ok(DigestKind::Sha1),
            "sha256" => Ok(DigestKind::Sha256),
            _ => Err(anyhow::anyhow!("unknown object format: {}", value)),
        }
    }
}

/// Object identifier
///
/// A validated lowercase hexadecimal string of 40 or 64 characters.
/// Implements utilities for parsing, binary serialization, and path
/// conversion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object ID from a string
    ///
    /// # Arguments
    ///
    /// * `id` - 40 or 64 character hexadecimal string
    pub fn try_parse(id: String) -> anyhow::Result<Self> {
        if id.len() != DigestKind::Sha1.hex_len() && id.len() != DigestKind::Sha256.hex_len() {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }
        Ok(Self(id.to_lowercase()))
    }

    /// Build an object ID from its raw binary form
    pub fn from_raw(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() != DigestKind::Sha1.raw_len() && bytes.len() != DigestKind::Sha256.raw_len()
        {
            return Err(anyhow::anyhow!(
                "Invalid raw object ID length: {}",
                bytes.len()
            ));
        }

        let mut hex = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            hex.push_str(&format!("{:02x}", byte));
        }

        Ok(Self(hex))
    }

    /// The digest variant this ID belongs to, derived from its length
    pub fn kind(&self) -> DigestKind {
        if self.0.len() == DigestKind::Sha256.hex_len() {
            DigestKind::Sha256
        } else {
            DigestKind::Sha1
        }
    }

    /// True for the all-zero digest
    pub fn is_null(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    /// Convert the hex form to raw bytes
    pub fn to_raw(&self) -> Vec<u8> {
        (0..self.0.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&self.0[i..i + 2], 16).unwrap_or_default())
            .collect()
    }

    /// Write the object ID in binary format (20 or 32 bytes)
    ///
    /// Used when serializing tree and commit objects and pack entries.
    pub fn write_raw_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.to_raw())?;

        Ok(())
    }

    /// Read an object ID in binary format for the given digest variant
    pub fn read_raw_from<R: io::Read + ?Sized>(
        reader: &mut R,
        kind: DigestKind,
    ) -> anyhow::Result<Self> {
        let mut buffer = vec![0u8; kind.raw_len()];
        reader.read_exact(&mut buffer)?;

        Self::from_raw(&buffer)
    }

    /// Convert to file system path for object storage
    ///
    /// Splits the hash as `XX/YYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Get abbreviated form of the object ID (first 7 characters)
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(7).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

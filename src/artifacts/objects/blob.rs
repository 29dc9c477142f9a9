//! Blob object
//!
//! Blobs store file content. They contain only the raw bytes, without any
//! metadata like filename or permissions (those live in trees).
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Write};

/// Blob object representing file content
///
/// Blobs are the fundamental unit of file storage. Each unique file content
/// is stored as a blob, identified by its digest. Content is kept as raw
/// bytes so binary files survive the round trip untouched.
#[derive(Debug, Clone, new)]
pub struct Blob {
    /// Raw file content
    content: Bytes,
}

impl Blob {
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        Blob {
            content: content.into(),
        }
    }

    /// Get the raw file content
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Interpret the content as UTF-8 text, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut blob_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), self.content.len());
        blob_bytes.write_all(header.as_bytes())?;
        blob_bytes.write_all(&self.content)?;

        Ok(Bytes::from(blob_bytes))
    }
}

impl Unpackable for Blob {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        // the header has already been read
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;

        Ok(Self::from_bytes(content))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn display(&self) -> String {
        self.text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object_id::DigestKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hello_blob_digest_matches_reference() {
        let blob = Blob::from_bytes(&b"hello\n"[..]);
        let oid = blob.object_id(DigestKind::Sha1).unwrap();

        assert_eq!(oid.as_ref(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_serialize_frames_content() {
        let blob = Blob::from_bytes(&b"hello\n"[..]);
        let bytes = blob.serialize().unwrap();

        assert_eq!(&bytes[..], b"blob 6\0hello\n");
    }

    #[test]
    fn test_binary_content_round_trips() {
        let data = vec![0u8, 1, 2, 255, 0, 42];
        let blob = Blob::from_bytes(data.clone());
        let framed = blob.serialize().unwrap();

        let payload = &framed[framed.iter().position(|&b| b == 0).unwrap() + 1..];
        let parsed = Blob::deserialize(std::io::Cursor::new(payload.to_vec())).unwrap();

        assert_eq!(parsed.content().as_ref(), data.as_slice());
    }
}

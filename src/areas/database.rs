//! Object database
//!
//! The database stores all objects (blobs, trees, commits, tags) using
//! content-addressable storage. Objects are identified by their digest and
//! live either loose or inside packs.
//!
//! ## Storage Format
//!
//! - Loose: `objects/ab/cdef123...` (first 2 hex chars as directory),
//!   zlib-compressed `<type> <size>\0<payload>` frame
//! - Packed: `objects/pack/pack-<digest>.pack` with a companion `.idx`
//!
//! ## Resolution order
//!
//! Reads consult loose objects first, then each pack through its index.
//! Writes always go loose; packs are produced by an offline pack step.

use crate::artifacts::core::cancel::CancelToken;
use crate::artifacts::core::error::EngineError;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable};
use crate::artifacts::objects::object_id::{DigestKind, ObjectId};
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::pack::pack_file::PackReader;
use anyhow::Context;
use bytes::Bytes;
use std::cell::RefCell;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Counter feeding unique temp file names within one process
static TEMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Object database
///
/// Manages storage and retrieval of content-addressable objects. The
/// database owns the on-disk object files and pack files exclusively.
#[derive(Debug)]
pub struct Database {
    /// Path to the objects directory (typically `.git/objects`)
    path: Box<Path>,
    /// Digest variant declared by the repository
    kind: DigestKind,
    /// Lazily opened packs, in directory order
    packs: RefCell<Option<Vec<PackReader>>>,
}

impl Database {
    pub fn new(path: Box<Path>, kind: DigestKind) -> Self {
        Database {
            path,
            kind,
            packs: RefCell::new(None),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DigestKind {
        self.kind
    }

    /// True when the object exists loose or in any pack
    pub fn has(&self, object_id: &ObjectId) -> bool {
        if self.path.join(object_id.to_path()).exists() {
            return true;
        }

        self.with_packs(|packs| Ok(packs.iter().any(|pack| pack.contains(object_id))))
            .unwrap_or(false)
    }

    /// Read an object's type and payload (frame header stripped)
    ///
    /// Consults loose storage first, then each pack.
    pub fn read(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectType, Bytes)> {
        let loose_path = self.path.join(object_id.to_path());
        if loose_path.exists() {
            let framed = self.read_object(loose_path)?;
            return Self::split_frame(object_id, framed);
        }

        let cancel = CancelToken::new();
        let packed = self.with_packs(|packs| {
            for pack in packs {
                if let Some(found) = pack.read(object_id, &cancel)? {
                    return Ok(Some(found));
                }
            }
            Ok(None)
        })?;

        packed.ok_or_else(|| EngineError::NotFound(format!("object {}", object_id)).into())
    }

    /// Store raw payload bytes as an object, returning its digest
    ///
    /// Idempotent: nothing is written when the object already exists,
    /// loose or packed.
    pub fn write(&self, object_type: ObjectType, payload: &[u8]) -> anyhow::Result<ObjectId> {
        let mut framed = Vec::with_capacity(payload.len() + 16);
        write!(framed, "{} {}\0", object_type.as_str(), payload.len())?;
        framed.write_all(payload)?;

        let object_id = self.kind.hash(&framed);
        if !self.has(&object_id) {
            self.write_loose(&object_id, Bytes::from(framed))?;
        }

        Ok(object_id)
    }

    /// Store a typed object, returning its digest
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let framed = object.serialize()?;
        let object_id = self.kind.hash(&framed);

        if !self.has(&object_id) {
            self.write_loose(&object_id, framed)?;
        }

        Ok(object_id)
    }

    /// Parse an object from the database into the appropriate type
    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, payload) = self.read(object_id)?;
        let reader = std::io::Cursor::new(payload);

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize_with(
                reader, self.kind,
            )?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(reader)?))),
            ObjectType::Tag => Ok(ObjectBox::Tag(Box::new(Tag::deserialize(reader)?))),
        }
    }

    /// Parse an object as a Blob, if it is one
    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Option<Blob>> {
        match self.parse_object(object_id)? {
            ObjectBox::Blob(blob) => Ok(Some(*blob)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a Tree, if it is one
    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(Some(*tree)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a Commit, if it is one
    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        match self.parse_object(object_id)? {
            ObjectBox::Commit(commit) => Ok(Some(*commit)),
            _ => Ok(None),
        }
    }

    /// Parse an object as a Tag, if it is one
    pub fn parse_object_as_tag(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tag>> {
        match self.parse_object(object_id)? {
            ObjectBox::Tag(tag) => Ok(Some(*tag)),
            _ => Ok(None),
        }
    }

    /// Get the type of an object without materializing it fully
    pub fn get_object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        let (object_type, _) = self.read(object_id)?;
        Ok(object_type)
    }

    fn split_frame(object_id: &ObjectId, framed: Bytes) -> anyhow::Result<(ObjectType, Bytes)> {
        let mut reader = std::io::Cursor::new(framed.clone());
        let object_type = ObjectType::parse_object_type(&mut reader)
            .map_err(|err| EngineError::Corrupt(format!("object {}: {}", object_id, err)))?;
        let payload_start = reader.position() as usize;

        // the header advertises the payload size; verify it
        let header = std::str::from_utf8(&framed[..payload_start - 1])
            .map_err(|_| EngineError::Corrupt(format!("object {}: bad header", object_id)))?;
        let advertised: usize = header
            .split(' ')
            .nth(1)
            .and_then(|size| size.parse().ok())
            .ok_or_else(|| EngineError::Corrupt(format!("object {}: bad header", object_id)))?;

        let payload = framed.slice(payload_start..);
        if payload.len() != advertised {
            return Err(EngineError::Corrupt(format!(
                "object {}: size mismatch ({} advertised, {} actual)",
                object_id,
                advertised,
                payload.len()
            ))
            .into());
        }

        Ok((object_type, payload))
    }

    fn read_object(&self, object_path: PathBuf) -> anyhow::Result<Bytes> {
        let object_content = std::fs::read(&object_path).context(format!(
            "Unable to read object file {}",
            object_path.display()
        ))?;

        Self::decompress(object_content.into())
    }

    fn write_loose(&self, object_id: &ObjectId, framed: Bytes) -> anyhow::Result<()> {
        let object_path = self.path.join(object_id.to_path());
        let object_dir = object_path
            .parent()
            .context(format!("Invalid object path {}", object_path.display()))?;

        std::fs::create_dir_all(object_dir).context(format!(
            "Unable to create object directory {}",
            object_dir.display()
        ))?;

        let temp_object_path = object_dir.join(Self::generate_temp_name());
        let compressed = Self::compress(framed)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .context(format!(
                "Unable to open object file {}",
                temp_object_path.display()
            ))?;

        file.write_all(&compressed).context(format!(
            "Unable to write object file {}",
            temp_object_path.display()
        ))?;
        drop(file);

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, &object_path).context(format!(
            "Unable to rename object file to {}",
            object_path.display()
        ))?;

        Ok(())
    }

    fn compress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(|compressed_content| compressed_content.into())
            .context("Unable to finish compressing object content")
    }

    fn decompress(data: Bytes) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(&*data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .map_err(|err| EngineError::Corrupt(format!("bad zlib stream: {}", err)))?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!(
            "tmp-obj-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Find all objects whose digest starts with the given prefix
    ///
    /// Scans the relevant loose directory and every pack index. Used to
    /// resolve abbreviated digests; more than one match means the prefix is
    /// ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let mut matches = Vec::new();

        if prefix.len() >= 2 {
            let dir_name = &prefix[..2];
            let file_prefix = &prefix[2..];
            let dir_path = self.path.join(dir_name);

            if dir_path.is_dir() {
                for entry in std::fs::read_dir(&dir_path)? {
                    let entry = entry?;
                    let file_name = entry.file_name();
                    let file_name_str = file_name.to_string_lossy();

                    if file_name_str.starts_with(file_prefix)
                        && let Ok(oid) =
                            ObjectId::try_parse(format!("{}{}", dir_name, file_name_str))
                    {
                        matches.push(oid);
                    }
                }
            }
        } else {
            // short prefixes have to scan every loose directory
            for i in 0..=255 {
                let dir_name = format!("{:02x}", i);
                let dir_path = self.path.join(&dir_name);

                if dir_path.is_dir() {
                    for entry in std::fs::read_dir(&dir_path)? {
                        let entry = entry?;
                        let file_name = entry.file_name();
                        let full_oid = format!("{}{}", dir_name, file_name.to_string_lossy());

                        if full_oid.starts_with(prefix)
                            && let Ok(oid) = ObjectId::try_parse(full_oid)
                        {
                            matches.push(oid);
                        }
                    }
                }
            }
        }

        self.with_packs(|packs| {
            for pack in packs {
                matches.extend(pack.index().oids_with_prefix(prefix));
            }
            Ok(())
        })?;

        matches.sort();
        matches.dedup();

        Ok(matches)
    }

    /// Run a closure over the lazily opened pack list
    fn with_packs<T>(
        &self,
        func: impl FnOnce(&[PackReader]) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        if self.packs.borrow().is_none() {
            let mut packs = Vec::new();
            let pack_dir = self.path.join("pack");

            if pack_dir.is_dir() {
                let mut pack_paths: Vec<PathBuf> = std::fs::read_dir(&pack_dir)?
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.extension().is_some_and(|ext| ext == "pack"))
                    .collect();
                pack_paths.sort();

                for pack_path in pack_paths {
                    // a pack without its idx is skipped, not fatal
                    if pack_path.with_extension("idx").exists() {
                        packs.push(PackReader::open(&pack_path, self.kind)?);
                    }
                }

                debug!(count = packs.len(), "loaded pack directory");
            }

            *self.packs.borrow_mut() = Some(packs);
        }

        let borrowed = self.packs.borrow();
        func(borrowed.as_ref().expect("packs just populated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::core::error::engine_error;
    use pretty_assertions::assert_eq;

    fn database(dir: &Path) -> Database {
        Database::new(dir.join("objects").into_boxed_path(), DigestKind::Sha1)
    }

    #[test]
    fn test_hello_blob_write_and_read_back() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        let oid = db.write(ObjectType::Blob, b"hello\n").unwrap();
        assert_eq!(oid.as_ref(), "ce013625030ba8dba906f756967f9e9ca394464a");

        let (object_type, payload) = db.read(&oid).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(payload.as_ref(), b"hello\n");
    }

    #[test]
    fn test_write_is_idempotent() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        let first = db.write(ObjectType::Blob, b"same content").unwrap();
        let second = db.write(ObjectType::Blob, b"same content").unwrap();

        assert_eq!(first, second);
        assert!(db.has(&first));
    }

    #[test]
    fn test_round_trip_for_every_object_type() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        for object_type in [
            ObjectType::Blob,
            ObjectType::Tree,
            ObjectType::Commit,
            ObjectType::Tag,
        ] {
            let payload = b"payload bytes".to_vec();
            let oid = db.write(object_type, &payload).unwrap();
            let (read_type, read_payload) = db.read(&oid).unwrap();

            assert_eq!(read_type, object_type);
            assert_eq!(read_payload.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        let absent = DigestKind::Sha1.hash(b"never written");
        let err = db.read(&absent).unwrap_err();

        assert!(matches!(
            engine_error(&err),
            Some(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_truncated_loose_object_is_corrupt() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        let oid = db.write(ObjectType::Blob, b"will be damaged").unwrap();
        let loose_path = dir.path().join("objects").join(oid.to_path());
        std::fs::write(&loose_path, b"not zlib at all").unwrap();

        let err = db.read(&oid).unwrap_err();
        assert!(matches!(engine_error(&err), Some(EngineError::Corrupt(_))));
    }

    #[test]
    fn test_prefix_search_disambiguates() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        let oid = db.write(ObjectType::Blob, b"findable").unwrap();
        let matches = db.find_objects_by_prefix(&oid.as_ref()[..8]).unwrap();

        assert_eq!(matches, vec![oid]);
    }

    /// Build a minimal one-blob pack + idx under `objects/pack`
    fn write_single_blob_pack(objects_dir: &Path, payload: &[u8]) -> ObjectId {
        use crate::artifacts::pack::{PACK_INDEX_SIGNATURE, PACK_SIGNATURE, PACK_VERSION};
        use std::io::Write as _;

        let kind = DigestKind::Sha1;
        let framed = [format!("blob {}\0", payload.len()).as_bytes(), payload].concat();
        let oid = kind.hash(&framed);

        let mut pack = Vec::new();
        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());

        let offset = pack.len() as u32;
        // entry header: type blob (3), size fits four bits for small payloads
        let mut byte = (3u8 << 4) | ((payload.len() & 0x0F) as u8);
        let mut remaining = payload.len() >> 4;
        if remaining > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
        while remaining > 0 {
            let mut next = (remaining & 0x7F) as u8;
            remaining >>= 7;
            if remaining > 0 {
                next |= 0x80;
            }
            pack.push(next);
        }
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        pack.extend(encoder.finish().unwrap());
        let trailer = kind.hash(&pack);
        pack.extend(trailer.to_raw());

        let mut idx = Vec::new();
        idx.extend_from_slice(PACK_INDEX_SIGNATURE);
        idx.extend_from_slice(&PACK_VERSION.to_be_bytes());
        let first = oid.to_raw()[0] as usize;
        for slot in 0..256 {
            let count: u32 = if slot >= first { 1 } else { 0 };
            idx.extend_from_slice(&count.to_be_bytes());
        }
        idx.extend_from_slice(&oid.to_raw());
        idx.extend_from_slice(&0u32.to_be_bytes());
        idx.extend_from_slice(&offset.to_be_bytes());
        idx.extend_from_slice(&[0u8; 20]);
        idx.extend_from_slice(&[0u8; 20]);

        let pack_dir = objects_dir.join("pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join("pack-single.pack"), &pack).unwrap();
        std::fs::write(pack_dir.join("pack-single.idx"), &idx).unwrap();

        oid
    }

    #[test]
    fn test_packed_object_reads_like_loose() {
        let dir = assert_fs::TempDir::new().unwrap();
        let db = database(dir.path());

        let payload = b"packed payload bytes";
        let oid = write_single_blob_pack(&dir.path().join("objects"), payload);

        // nothing loose for this digest, the pack serves the read
        assert!(db.has(&oid));
        let (object_type, bytes) = db.read(&oid).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(bytes.as_ref(), payload);

        // writing the same payload loose reproduces the same digest
        let loose_oid = db.write(ObjectType::Blob, payload).unwrap();
        assert_eq!(loose_oid, oid);
    }
}

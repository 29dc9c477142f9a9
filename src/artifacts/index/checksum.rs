//! Index trailer checksum
//!
//! The index file ends with a digest of every preceding byte. Readers verify
//! it before trusting any entry; writers append it as the final step.

use crate::artifacts::core::error::EngineError;
use crate::artifacts::objects::object_id::DigestKind;

/// Verify the trailing digest and return the body it covers
pub fn verify_trailer(data: &[u8], kind: DigestKind) -> anyhow::Result<&[u8]> {
    let digest_len = kind.raw_len();

    if data.len() < digest_len {
        return Err(EngineError::Corrupt("index smaller than its checksum".to_string()).into());
    }

    let (body, trailer) = data.split_at(data.len() - digest_len);
    let expected = kind.hash(body);

    if expected.to_raw() != trailer {
        return Err(
            EngineError::Corrupt("index checksum does not match value stored on disk".to_string())
                .into(),
        );
    }

    Ok(body)
}

/// Append the trailing digest over everything written so far
pub fn append_trailer(buffer: &mut Vec<u8>, kind: DigestKind) {
    let digest = kind.hash(buffer);
    buffer.extend_from_slice(&digest.to_raw());
}

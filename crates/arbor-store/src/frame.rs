//! Integrity frame around canonical payload bytes.

use arbor_codec::{CodecError, Reader, Writer};
use tracing::warn;

use crate::StoreError;

pub const MAGIC: [u8; 4] = *b"ARBR";
pub const FORMAT_VERSION: u16 = 1;
/// Magic + version + digest + payload length.
pub const HEADER_LEN: usize = 4 + 2 + 32 + 4;

/// Parsed frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u16,
    pub digest: blake3::Hash,
    pub payload_len: u32,
}

/// Wrap `payload` in a frame.
///
/// # Panics
///
/// Panics if the payload is larger than `u32::MAX` bytes.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("frame payload exceeds u32::MAX bytes");
    let mut w = Writer::new();
    w.write_raw(&MAGIC);
    w.write_u16(FORMAT_VERSION);
    w.write_raw(blake3::hash(payload).as_bytes());
    w.write_u32(len);
    w.write_raw(payload);
    w.into_bytes()
}

/// Validate a frame and return its header and payload.
///
/// With `verify_digest` off the recorded digest is parsed but not checked.
pub fn decode_frame(bytes: &[u8], verify_digest: bool) -> Result<(FrameHeader, &[u8]), StoreError> {
    let mut r = Reader::new(bytes);

    let mut found = [0u8; 4];
    found.copy_from_slice(r.read_raw(4)?);
    if found != MAGIC {
        return Err(StoreError::BadMagic { found });
    }

    let version = r.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion { found: version });
    }

    let mut digest = [0u8; 32];
    digest.copy_from_slice(r.read_raw(32)?);
    let digest = blake3::Hash::from(digest);

    let payload_len = r.read_u32()?;
    let payload = r.read_raw(payload_len as usize)?;
    if r.remaining() > 0 {
        return Err(CodecError::TrailingBytes(r.remaining()).into());
    }

    if verify_digest {
        let computed = blake3::hash(payload);
        if computed != digest {
            return Err(StoreError::DigestMismatch {
                recorded: digest.to_hex().to_string(),
                computed: computed.to_hex().to_string(),
            });
        }
    } else {
        warn!("frame digest verification is disabled");
    }

    let header = FrameHeader {
        version,
        digest,
        payload_len,
    };
    Ok((header, payload))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

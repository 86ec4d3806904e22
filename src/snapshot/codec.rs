//! Framed binary codec for snapshot files.
//!
//! ```text
//! [magic: "SBUS"][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::io::{Read, Write};

use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::SnapshotError;

/// Current codec version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes opening every snapshot file.
pub const MAGIC: [u8; 4] = *b"SBUS";

/// Frames larger than this are rejected without allocating.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Serializes `value` into one frame.
///
/// # Errors
/// `SnapshotError::Io` if `value` does not serialize,
/// `SnapshotError::Corrupted` if it exceeds [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, SnapshotError> {
    let data = serde_json::to_vec(value).map_err(std::io::Error::from)?;
    if data.len() > MAX_FRAME_SIZE {
        return Err(SnapshotError::Corrupted {
            reason: format!("frame size {} exceeds maximum {MAX_FRAME_SIZE}", data.len()),
        });
    }
    let len = u32::try_from(data.len()).map_err(|_| SnapshotError::Corrupted {
        reason: "frame length does not fit in u32".to_string(),
    })?;

    let mut out = Vec::with_capacity(MAGIC.len() + 1 + 4 + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&checksum(&data).to_le_bytes());
    Ok(out)
}

/// Writes one frame.
///
/// # Errors
/// As for [`encode`], plus I/O errors from `writer`.
pub fn write_frame<T: Serialize>(writer: &mut impl Write, value: &T) -> Result<(), SnapshotError> {
    writer.write_all(&encode(value)?)?;
    Ok(())
}

/// Reads and verifies one frame.
///
/// # Errors
/// - `SnapshotError::Corrupted` on bad magic, an oversize length, a checksum
///   mismatch or undecodable JSON.
/// - `SnapshotError::UnsupportedVersion` on a version other than
///   [`CODEC_VERSION`].
/// - `SnapshotError::Io` on a truncated read.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T, SnapshotError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(SnapshotError::Corrupted {
            reason: format!("invalid magic bytes: expected {MAGIC:?}, got {magic:?}"),
        });
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            found: version[0],
            expected: CODEC_VERSION,
        });
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(SnapshotError::Corrupted {
            reason: format!("frame size {len} exceeds maximum {MAX_FRAME_SIZE}"),
        });
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(SnapshotError::Corrupted {
            reason: format!("CRC mismatch: stored={stored:08x}, computed={computed:08x}"),
        });
    }

    serde_json::from_slice(&data).map_err(|e| SnapshotError::Corrupted {
        reason: format!("deserialization failed: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_frame_layout() {
        let encoded = encode(&json!({ "count": 1 })).unwrap();
        assert_eq!(&encoded[..4], b"SBUS");
        assert_eq!(encoded[4], CODEC_VERSION);
        let len = u32::from_le_bytes([encoded[5], encoded[6], encoded[7], encoded[8]]) as usize;
        assert_eq!(encoded.len(), 4 + 1 + 4 + len + 4);

        let decoded: serde_json::Value = decode(&mut Cursor::new(encoded)).unwrap();
        assert_eq!(decoded, json!({ "count": 1 }));
    }

    #[test]
    fn test_detects_corruption() {
        let mut encoded = encode(&json!({ "count": 1 })).unwrap();
        encoded[10] ^= 0xFF;
        let err = decode::<serde_json::Value>(&mut Cursor::new(encoded)).unwrap_err();
        assert!(matches!(err, SnapshotError::Corrupted { .. }));
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let mut encoded = encode(&json!(null)).unwrap();
        encoded[0] = b'X';
        let err = decode::<serde_json::Value>(&mut Cursor::new(encoded)).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));

        let mut encoded = encode(&json!(null)).unwrap();
        encoded[4] = 9;
        let err = decode::<serde_json::Value>(&mut Cursor::new(encoded)).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedVersion { found: 9, expected: 1 }));
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let mut bad = MAGIC.to_vec();
        bad.push(CODEC_VERSION);
        bad.extend_from_slice(&200_000_000u32.to_le_bytes());
        let err = decode::<serde_json::Value>(&mut Cursor::new(bad)).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let encoded = encode(&json!({ "count": 1 })).unwrap();
        let err = decode::<serde_json::Value>(&mut Cursor::new(&encoded[..7])).unwrap_err();
        assert!(matches!(err, SnapshotError::Io(_)));
    }
}

//! On-disk frame for slot and backup files.
//!
//! ```text
//! ┌───────┬────────┬────────────┬─────────┬─────────┬──────────┐
//! │ magic │ schema │ timestamp  │ length  │ payload │ checksum │
//! │ DFSV  │ u16 LE │ i64 ms LE  │ u32 LE  │ length  │ 32 bytes │
//! └───────┴────────┴────────────┴─────────┴─────────┴──────────┘
//! ```
//!
//! The checksum is BLAKE3 over every byte before it and is verified
//! before any other field is trusted.

/// Identifies a save file.
pub const MAGIC: &[u8; 4] = b"DFSV";

pub const HEADER_LEN: usize = 4 + 2 + 8 + 4;
pub const CHECKSUM_LEN: usize = 32;
pub const MIN_FILE_LEN: usize = HEADER_LEN + CHECKSUM_LEN;

/// Parsed fixed-size header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub schema_version: u16,
    pub timestamp_ms: i64,
    pub payload_len: u32,
}

/// A verified frame borrowed from file bytes.
#[derive(Debug)]
pub struct Frame<'a> {
    pub header: FileHeader,
    pub payload: &'a [u8],
    pub checksum: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Bytes do not match the stored checksum (or are too short to hold one).
    Checksum,
    /// Checksum matches but the structure is invalid.
    Corrupt(String),
    /// Payload does not fit the 32-bit length field.
    TooLarge(usize),
}

/// Build a complete file image around `payload`.
pub fn frame(
    schema_version: u16,
    timestamp_ms: i64,
    payload: &[u8],
) -> Result<(Vec<u8>, [u8; 32]), FrameError> {
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;

    let mut out = Vec::with_capacity(MIN_FILE_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&schema_version.to_le_bytes());
    out.extend_from_slice(&timestamp_ms.to_le_bytes());
    out.extend_from_slice(&payload_len.to_le_bytes());
    out.extend_from_slice(payload);

    let checksum = *blake3::hash(&out).as_bytes();
    out.extend_from_slice(&checksum);
    Ok((out, checksum))
}

/// Verify the checksum, then parse the header.
pub fn verify(bytes: &[u8]) -> Result<Frame<'_>, FrameError> {
    if bytes.len() < MIN_FILE_LEN {
        return Err(FrameError::Checksum);
    }
    let (body, stored) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if blake3::hash(body).as_bytes() != stored {
        return Err(FrameError::Checksum);
    }

    let header = parse_header(body)?;
    let payload = &body[HEADER_LEN..];
    if payload.len() != header.payload_len as usize {
        return Err(FrameError::Corrupt(format!(
            "declared payload length {} but found {}",
            header.payload_len,
            payload.len()
        )));
    }

    let mut checksum = [0u8; 32];
    checksum.copy_from_slice(stored);
    Ok(Frame {
        header,
        payload,
        checksum,
    })
}

/// Parse the header without verifying the checksum.
///
/// Only for metadata listings; never trust the payload of an unverified file.
pub fn parse_header(bytes: &[u8]) -> Result<FileHeader, FrameError> {
    if bytes.len() < HEADER_LEN {
        return Err(FrameError::Corrupt("file shorter than header".into()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(FrameError::Corrupt("bad magic bytes".into()));
    }
    let schema_version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&bytes[6..14]);
    let timestamp_ms = i64::from_le_bytes(ts);
    let payload_len = u32::from_le_bytes([bytes[14], bytes[15], bytes[16], bytes[17]]);
    Ok(FileHeader {
        schema_version,
        timestamp_ms,
        payload_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_bytes_verify() {
        let (bytes, checksum) = frame(3, 1_700_000_000_000, b"hello").unwrap();
        assert_eq!(bytes.len(), MIN_FILE_LEN + 5);
        let f = verify(&bytes).unwrap();
        assert_eq!(f.header.schema_version, 3);
        assert_eq!(f.header.timestamp_ms, 1_700_000_000_000);
        assert_eq!(f.payload, b"hello");
        assert_eq!(f.checksum, checksum);
    }

    #[test]
    fn every_flipped_byte_fails_checksum() {
        let (bytes, _) = frame(1, 42, b"payload bytes").unwrap();
        for i in 0..bytes.len() {
            let mut damaged = bytes.clone();
            damaged[i] ^= 0x01;
            assert_eq!(verify(&damaged).unwrap_err(), FrameError::Checksum, "byte {}", i);
        }
    }

    #[test]
    fn truncated_file_fails_checksum() {
        let (bytes, _) = frame(1, 42, b"abc").unwrap();
        assert_eq!(verify(&bytes[..bytes.len() - 1]).unwrap_err(), FrameError::Checksum);
        assert_eq!(verify(&[]).unwrap_err(), FrameError::Checksum);
    }

    #[test]
    fn bad_magic_with_valid_checksum_is_corrupt() {
        let (mut bytes, _) = frame(1, 42, b"abc").unwrap();
        bytes[0] = b'X';
        let body_len = bytes.len() - CHECKSUM_LEN;
        let fixed = *blake3::hash(&bytes[..body_len]).as_bytes();
        bytes[body_len..].copy_from_slice(&fixed);
        assert!(matches!(verify(&bytes), Err(FrameError::Corrupt(_))));
    }

    #[test]
    fn empty_payload_is_allowed() {
        let (bytes, _) = frame(1, 0, &[]).unwrap();
        assert_eq!(verify(&bytes).unwrap().payload.len(), 0);
    }
}

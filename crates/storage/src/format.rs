//! Object file format for the content-addressable store
//!
//! ## File Format
//!
//! ```text
//! HEADER (32 bytes):
//!   magic "FSOB"            4B
//!   metadata_length         u32 LE    → header length, currently 32
//!   original_size           u64 LE    → decoded payload size
//!   stored_size             u64 LE    → payload bytes following the header
//!   is_compressed           u8
//!   algorithm_tag           u8        → see codec::Algorithm
//!   reserved                u16
//!   payload_crc32           u32 LE
//!
//! PAYLOAD (stored_size bytes)
//! ```

use crate::codec::Algorithm;
use byteorder::{ByteOrder, LittleEndian};
use framestore_core::{Error, Result};

/// Magic bytes for object files
pub const OBJECT_MAGIC: &[u8; 4] = b"FSOB";
/// Header size in bytes
pub const OBJECT_HEADER_SIZE: usize = 32;

/// Fixed-layout header at the start of every object file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Length of the header itself
    pub metadata_length: u32,
    /// Size of the decoded payload
    pub original_size: u64,
    /// Size of the payload as stored
    pub stored_size: u64,
    /// Whether the payload went through a compressing codec
    pub is_compressed: bool,
    /// Codec that produced the payload
    pub algorithm: Algorithm,
    /// CRC32 of the stored payload
    pub payload_crc32: u32,
}

impl ObjectHeader {
    /// Header for a payload as it will be written
    pub fn for_payload(original_size: usize, payload: &[u8], algorithm: Algorithm) -> Self {
        ObjectHeader {
            metadata_length: OBJECT_HEADER_SIZE as u32,
            original_size: original_size as u64,
            stored_size: payload.len() as u64,
            is_compressed: algorithm != Algorithm::Identity,
            algorithm,
            payload_crc32: crc32fast::hash(payload),
        }
    }

    /// Serialize to the 32-byte layout
    pub fn to_bytes(&self) -> [u8; OBJECT_HEADER_SIZE] {
        let mut buf = [0u8; OBJECT_HEADER_SIZE];
        buf[0..4].copy_from_slice(OBJECT_MAGIC);
        LittleEndian::write_u32(&mut buf[4..8], self.metadata_length);
        LittleEndian::write_u64(&mut buf[8..16], self.original_size);
        LittleEndian::write_u64(&mut buf[16..24], self.stored_size);
        buf[24] = self.is_compressed as u8;
        buf[25] = self.algorithm.tag();
        // 26..28 reserved
        LittleEndian::write_u32(&mut buf[28..32], self.payload_crc32);
        buf
    }

    /// Parse and validate a header at the start of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < OBJECT_HEADER_SIZE {
            return Err(Error::corrupted(format!(
                "object too small for header: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != OBJECT_MAGIC {
            return Err(Error::corrupted("bad object magic"));
        }
        let metadata_length = LittleEndian::read_u32(&bytes[4..8]);
        if metadata_length as usize != OBJECT_HEADER_SIZE {
            return Err(Error::corrupted(format!(
                "unsupported header length {}",
                metadata_length
            )));
        }
        let is_compressed = match bytes[24] {
            0 => false,
            1 => true,
            other => {
                return Err(Error::corrupted(format!("bad compression flag {}", other)));
            }
        };
        let algorithm = Algorithm::from_tag(bytes[25])
            .ok_or_else(|| Error::corrupted(format!("unknown codec tag {}", bytes[25])))?;
        if is_compressed != (algorithm != Algorithm::Identity) {
            return Err(Error::corrupted("compression flag disagrees with codec tag"));
        }
        Ok(ObjectHeader {
            metadata_length,
            original_size: LittleEndian::read_u64(&bytes[8..16]),
            stored_size: LittleEndian::read_u64(&bytes[16..24]),
            is_compressed,
            algorithm,
            payload_crc32: LittleEndian::read_u32(&bytes[28..32]),
        })
    }

    /// Locate and verify the payload following this header.
    pub fn payload<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.metadata_length as usize;
        let end = start
            .checked_add(self.stored_size as usize)
            .ok_or_else(|| Error::corrupted("stored size overflows"))?;
        if bytes.len() != end {
            return Err(Error::corrupted(format!(
                "object length {} does not match header ({} expected)",
                bytes.len(),
                end
            )));
        }
        let payload = &bytes[start..end];
        let actual = crc32fast::hash(payload);
        if actual != self.payload_crc32 {
            return Err(Error::corrupted(format!(
                "payload checksum mismatch: stored {:08x}, computed {:08x}",
                self.payload_crc32, actual
            )));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(payload: &[u8], algorithm: Algorithm) -> Vec<u8> {
        let header = ObjectHeader::for_payload(payload.len(), payload, algorithm);
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_header_roundtrip() {
        let bytes = encoded(b"payload", Algorithm::Identity);
        let header = ObjectHeader::parse(&bytes).unwrap();
        assert_eq!(header.original_size, 7);
        assert!(!header.is_compressed);
        assert_eq!(header.payload(&bytes).unwrap(), b"payload");
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encoded(b"payload", Algorithm::Identity);
        bytes[0] = b'X';
        assert!(matches!(
            ObjectHeader::parse(&bytes),
            Err(Error::CorruptedContent(_))
        ));
    }

    #[test]
    fn test_truncated_payload_detected() {
        let mut bytes = encoded(b"some longer payload", Algorithm::Identity);
        bytes.truncate(bytes.len() - 3);
        let header = ObjectHeader::parse(&bytes).unwrap();
        assert!(matches!(
            header.payload(&bytes),
            Err(Error::CorruptedContent(_))
        ));
    }

    #[test]
    fn test_bit_flip_detected() {
        let mut bytes = encoded(b"some longer payload", Algorithm::Identity);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let header = ObjectHeader::parse(&bytes).unwrap();
        let err = header.payload(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_too_small() {
        assert!(ObjectHeader::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_flag_and_tag_must_agree() {
        let mut bytes = encoded(b"payload", Algorithm::Identity);
        bytes[24] = 1;
        assert!(ObjectHeader::parse(&bytes).is_err());
    }
}

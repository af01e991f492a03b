//! Blob codec definitions.
//!
//! Every payload larger than the compression threshold passes through a codec
//! before it reaches disk. The algorithm tag is written into the blob header so
//! an object always says how to decode itself.

use framestore_core::Error;

/// Algorithm tag stored in the blob header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Algorithm {
    /// Payload stored verbatim
    Identity = 0,
    /// Payload compressed with zstd
    Zstd = 1,
}

impl Algorithm {
    /// Parse a header tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Algorithm::Identity),
            1 => Some(Algorithm::Zstd),
            _ => None,
        }
    }

    /// Header tag
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Blob codec trait.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync`; retrievals decode concurrently.
pub trait BlobCodec: Send + Sync {
    /// Encode bytes for storage.
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes read from storage.
    ///
    /// `original_size` comes from the header and bounds the output buffer.
    fn decode(&self, data: &[u8], original_size: usize) -> Result<Vec<u8>, CodecError>;

    /// Tag written into the header
    fn algorithm(&self) -> Algorithm;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Encoding failed
    #[error("Encode error ({algorithm:?}): {detail}")]
    Encode {
        /// Human-readable error description
        detail: String,
        /// Codec that attempted the encode
        algorithm: Algorithm,
    },

    /// Decoding failed (invalid frame, size mismatch)
    #[error("Decode error ({algorithm:?}, data_len={data_len}): {detail}")]
    Decode {
        /// Human-readable error description
        detail: String,
        /// Codec that attempted the decode
        algorithm: Algorithm,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Unknown algorithm tag in a header
    #[error("Unknown codec tag: {0}")]
    UnknownAlgorithm(u8),
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Encode { .. } => Error::encoding(e.to_string()),
            CodecError::Decode { .. } => Error::decompression(e.to_string()),
            CodecError::UnknownAlgorithm(_) => Error::corrupted(e.to_string()),
        }
    }
}

/// Pass-through codec
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl BlobCodec for IdentityCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }

    fn decode(&self, data: &[u8], original_size: usize) -> Result<Vec<u8>, CodecError> {
        if data.len() != original_size {
            return Err(CodecError::Decode {
                detail: format!("expected {} bytes", original_size),
                algorithm: Algorithm::Identity,
                data_len: data.len(),
            });
        }
        Ok(data.to_vec())
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Identity
    }
}

/// zstd codec at a fixed level
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Create a codec with the given compression level (1..=22)
    pub fn new(level: i32) -> Self {
        ZstdCodec { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        // Level 3 is zstd's own default: fast enough for the write path.
        ZstdCodec { level: 3 }
    }
}

impl BlobCodec for ZstdCodec {
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::bulk::compress(data, self.level).map_err(|e| CodecError::Encode {
            detail: e.to_string(),
            algorithm: Algorithm::Zstd,
        })
    }

    fn decode(&self, data: &[u8], original_size: usize) -> Result<Vec<u8>, CodecError> {
        let out = zstd::bulk::decompress(data, original_size).map_err(|e| CodecError::Decode {
            detail: e.to_string(),
            algorithm: Algorithm::Zstd,
            data_len: data.len(),
        })?;
        if out.len() != original_size {
            return Err(CodecError::Decode {
                detail: format!("decoded {} bytes, header says {}", out.len(), original_size),
                algorithm: Algorithm::Zstd,
                data_len: data.len(),
            });
        }
        Ok(out)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Zstd
    }
}

/// Codec for a header tag
pub fn codec_for(algorithm: Algorithm) -> Box<dyn BlobCodec> {
    match algorithm {
        Algorithm::Identity => Box::new(IdentityCodec),
        Algorithm::Zstd => Box::new(ZstdCodec::default()),
    }
}

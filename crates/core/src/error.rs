//! Error types for the framestore engine
//!
//! This module defines the error taxonomy shared by every subsystem.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Propagation rules:
//! - Caller-initiated operations (`store`, `retrieve`, `append`) return these
//!   errors to the caller.
//! - Background work (pre-rendering, index builds, stats warm-up) logs them and
//!   moves on.

use std::io;
use thiserror::Error;

/// Result type alias for framestore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the framestore engine
#[derive(Debug, Error)]
pub enum Error {
    /// Content, hash or reference is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Checksum, header or framing mismatch in stored data
    #[error("Corrupted content: {0}")]
    CorruptedContent(String),

    /// Codec could not restore the original bytes
    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    /// Bytes could not be encoded or decoded as the expected representation
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// I/O error (disk read/write failure)
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    /// A bounded structure is full
    ///
    /// Soft condition: callers respond by evicting, not by failing the request.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Configuration value rejected during validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a `NotFound` error
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// Create a `CorruptedContent` error
    pub fn corrupted(detail: impl Into<String>) -> Self {
        Error::CorruptedContent(detail.into())
    }

    /// Create a `DecompressionFailed` error
    pub fn decompression(detail: impl Into<String>) -> Self {
        Error::DecompressionFailed(detail.into())
    }

    /// Create an `EncodingFailed` error
    pub fn encoding(detail: impl Into<String>) -> Self {
        Error::EncodingFailed(detail.into())
    }

    /// Create an `InvalidConfig` error
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Error::InvalidConfig(detail.into())
    }

    /// Whether the error is a soft condition that callers should absorb.
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::CapacityExceeded(_))
    }

    /// Whether the error indicates damaged on-disk data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptedContent(_) | Error::DecompressionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        let msg = err.to_string();
        assert!(msg.contains("I/O failure"));
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::not_found("blob 0afe");
        assert_eq!(err.to_string(), "Not found: blob 0afe");
    }

    #[test]
    fn test_error_display_corruption() {
        let err = Error::corrupted("CRC check failed");
        let msg = err.to_string();
        assert!(msg.contains("Corrupted content"));
        assert!(msg.contains("CRC check failed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_soft_and_corruption_classification() {
        assert!(Error::CapacityExceeded("render cache".into()).is_soft());
        assert!(!Error::not_found("x").is_soft());
        assert!(Error::corrupted("bad magic").is_corruption());
        assert!(Error::decompression("zstd").is_corruption());
        assert!(!Error::encoding("utf8").is_corruption());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }

        fn returns_error() -> Result<i32> {
            Err(Error::invalid_config("frame_budget_ms must be positive"))
        }

        assert_eq!(returns_result().unwrap(), 42);
        assert!(returns_error().is_err());
    }
}

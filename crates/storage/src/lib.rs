//! Storage layer for Framestore
//!
//! This crate implements the two storage structures that sit closest to the
//! raw records:
//! - ContentAddressableStore: SHA-256 keyed, deduplicating, optionally
//!   compressed blob storage with persisted reference counts
//! - ColumnarStore: structure-of-arrays projection for O(1) row fetch and
//!   cache-friendly scans
//! - Blob codec and object header format used by the content store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cas;
pub mod codec;
pub mod columnar;
pub mod format;

pub use cas::{CasConfig, CasStats, ContentAddressableStore, GcReport};
pub use codec::{Algorithm, BlobCodec, CodecError, IdentityCodec, ZstdCodec};
pub use columnar::{ColumnarRow, ColumnarStore, RowIndex, RowInput, StringColumn};
pub use format::{ObjectHeader, OBJECT_HEADER_SIZE};

//! Core types for Framestore
//!
//! This crate defines the foundational types used throughout the engine:
//! - RecordId, Category, Record: the external store's records as seen by the engine
//! - ContentHash, ContentReference: content-addressed identity
//! - FieldName, FieldValue, FieldUpdate, LogToken: write-ahead log payloads
//! - SearchResult, TextStatistics, RenderedOutput: values returned to the UI
//! - Error: error taxonomy shared by all subsystems

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod results;
pub mod types;
pub mod update;

pub use error::{Error, Result};
pub use results::{Complexity, HighlightRange, RenderedOutput, SearchResult, TextStatistics};
pub use types::{Category, ContentHash, ContentReference, Record, RecordId};
pub use update::{FieldName, FieldUpdate, FieldValue, LogToken};

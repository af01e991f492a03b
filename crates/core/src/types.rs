//! Record, identity and content-addressing types
//!
//! - RecordId: 128-bit identifier of a user-visible record
//! - Category: closed set of record kinds
//! - Record: read-only snapshot supplied by the external store
//! - ContentHash: SHA-256 digest used as content identity
//! - ContentReference: handle to a deduplicated blob

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// RecordId
// ============================================================================

/// Unique identifier for a record
///
/// Wraps a UUID v4. Records are owned by the external store; the engine only
/// uses the id to correlate caches, index postings and WAL entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new random RecordId
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        RecordId(uuid)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw 16 bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RecordId)
    }
}

// ============================================================================
// Category
// ============================================================================

/// Record category
///
/// Small closed set. Behavior that varies by category (rendering, preview
/// width) matches on this enum exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Category {
    /// Free-form prose
    Note = 0,
    /// Source code
    Code = 1,
    /// A URL, optionally with a description
    Link = 2,
    /// Markdown document
    Markdown = 3,
    /// Checklist / todo items
    Checklist = 4,
    /// Anything else
    Other = 5,
}

impl Category {
    /// All categories in tag order
    pub const ALL: [Category; 6] = [
        Category::Note,
        Category::Code,
        Category::Link,
        Category::Markdown,
        Category::Checklist,
        Category::Other,
    ];

    /// Stable one-byte tag
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a one-byte tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Note => "note",
            Category::Code => "code",
            Category::Link => "link",
            Category::Markdown => "markdown",
            Category::Checklist => "checklist",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

// ============================================================================
// Record
// ============================================================================

/// A user-visible document, as supplied by the external store.
///
/// The engine never mutates records. It reads snapshots and derives caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    /// Short title
    pub title: String,
    /// Body text, can be megabytes
    pub body: String,
    /// Category
    pub category: Category,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
    /// Favorite flag
    pub is_favorite: bool,
    /// Number of times viewed
    pub view_count: u64,
    /// Number of times copied
    pub copy_count: u64,
    /// Tag names (order irrelevant)
    pub tags: BTreeSet<String>,
}

impl Record {
    /// Create a record with fresh id and timestamps and zeroed counters.
    pub fn new(title: impl Into<String>, body: impl Into<String>, category: Category) -> Self {
        let now = Utc::now();
        Record {
            id: RecordId::new(),
            title: title.into(),
            body: body.into(),
            category,
            created_at: now,
            modified_at: now,
            is_favorite: false,
            view_count: 0,
            copy_count: 0,
            tags: BTreeSet::new(),
        }
    }

    /// Builder-style tag insertion
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Text that search and statistics operate on: title, newline, body.
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + 1 + self.body.len());
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.body);
        text
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// SHA-256 digest identifying content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw bytes
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    /// Hash UTF-8 text
    pub fn of_str(text: &str) -> Self {
        Self::of(text.as_bytes())
    }

    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding (64 chars)
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.0 {
            s.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('0'));
            s.push(char::from_digit((b & 0x0F) as u32, 16).unwrap_or('0'));
        }
        s
    }

    /// Parse 64 hex chars
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, pair) in hex.as_bytes().chunks_exact(2).enumerate() {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            out[i] = (hi * 16 + lo) as u8;
        }
        Some(ContentHash(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell hashes apart in logs
        write!(f, "ContentHash({}…)", &self.to_hex()[..12])
    }
}

// ============================================================================
// ContentReference
// ============================================================================

/// Handle to a blob in the content-addressable store.
///
/// Equal hashes always denote bit-identical decompressed content.
/// `reference_count` is the count observed when this reference was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    /// Content digest
    pub hash: ContentHash,
    /// Original (decompressed) size in bytes
    pub size: u64,
    /// Reference count at the time this handle was produced
    pub reference_count: u64,
}

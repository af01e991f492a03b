//! WAL entry types and the line codec
//!
//! The log file is line oriented. Every line is a tab-separated record
//! terminated by the CRC32 (hex) of everything before the final tab:
//!
//! ```text
//! E <id> <record> <field> <old> <new> <update_us> <entry_us> <committed> <crc>
//! M <id> <crc>
//! C <next_id> <timestamp_us> <crc>
//! ```
//!
//! Old and new values are JSON encoded and then base64 encoded so they can
//! never contain a tab or newline.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use framestore_core::{FieldName, FieldUpdate, FieldValue, LogToken, RecordId};
use thiserror::Error;

const SEP: char = '\t';

/// A field update together with its log bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Monotonic entry id, never reused within one log file lineage
    pub id: u64,
    /// The change itself
    pub update: FieldUpdate,
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
    /// Set once the external store has absorbed the change
    pub committed: bool,
}

impl LogEntry {
    /// Token handed back to the caller of `append`.
    pub fn token(&self) -> LogToken {
        LogToken(self.id)
    }
}

/// One decoded line of the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalLine {
    /// A full entry
    Entry(LogEntry),
    /// Commit marker for the entry with this id
    Commit(u64),
    /// Checkpoint marker; everything before it has been compacted away
    Checkpoint {
        /// Next id the log will hand out
        next_id: u64,
        /// When the checkpoint was taken
        timestamp: DateTime<Utc>,
    },
}

/// Why a line could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    /// CRC mismatch
    #[error("checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    Checksum {
        /// CRC written on the line
        stored: u32,
        /// CRC of the line body
        computed: u32,
    },

    /// Structurally invalid line
    #[error("malformed line: {0}")]
    Malformed(String),

    /// Value could not be serialized
    #[error("value encoding failed: {0}")]
    Encoding(String),
}

fn malformed(detail: impl Into<String>) -> LineError {
    LineError::Malformed(detail.into())
}

impl WalLine {
    /// Encode to a single newline-terminated line.
    pub fn encode(&self) -> Result<String, LineError> {
        let body = match self {
            WalLine::Entry(entry) => {
                let update = &entry.update;
                let fields = [
                    "E".to_string(),
                    entry.id.to_string(),
                    update.record_id.to_string(),
                    update.field.as_str().to_string(),
                    encode_value(&update.old_value)?,
                    encode_value(&update.new_value)?,
                    update.timestamp.timestamp_micros().to_string(),
                    entry.timestamp.timestamp_micros().to_string(),
                    if entry.committed { "1" } else { "0" }.to_string(),
                ];
                fields.join("\t")
            }
            WalLine::Commit(id) => format!("M{SEP}{id}"),
            WalLine::Checkpoint { next_id, timestamp } => {
                format!("C{SEP}{next_id}{SEP}{}", timestamp.timestamp_micros())
            }
        };
        let crc = crc32fast::hash(body.as_bytes());
        Ok(format!("{body}{SEP}{crc:08x}\n"))
    }

    /// Decode one line. A trailing `\n` is accepted but not required.
    pub fn decode(line: &str) -> Result<Self, LineError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let (body, crc_hex) = line
            .rsplit_once(SEP)
            .ok_or_else(|| malformed("missing checksum"))?;
        let stored = u32::from_str_radix(crc_hex, 16)
            .map_err(|_| malformed(format!("bad checksum field '{crc_hex}'")))?;
        let computed = crc32fast::hash(body.as_bytes());
        if stored != computed {
            return Err(LineError::Checksum { stored, computed });
        }

        let fields: Vec<&str> = body.split(SEP).collect();
        match fields.as_slice() {
            ["E", id, record, field, old, new, update_us, entry_us, committed] => {
                let record_id: RecordId = record
                    .parse()
                    .map_err(|_| malformed(format!("bad record id '{record}'")))?;
                let field: FieldName = field.parse().map_err(malformed)?;
                let committed = match *committed {
                    "0" => false,
                    "1" => true,
                    other => return Err(malformed(format!("bad committed flag '{other}'"))),
                };
                Ok(WalLine::Entry(LogEntry {
                    id: parse_u64(id)?,
                    update: FieldUpdate {
                        record_id,
                        field,
                        old_value: decode_value(old)?,
                        new_value: decode_value(new)?,
                        timestamp: parse_micros(update_us)?,
                    },
                    timestamp: parse_micros(entry_us)?,
                    committed,
                }))
            }
            ["M", id] => Ok(WalLine::Commit(parse_u64(id)?)),
            ["C", next_id, ts] => Ok(WalLine::Checkpoint {
                next_id: parse_u64(next_id)?,
                timestamp: parse_micros(ts)?,
            }),
            _ => Err(malformed(format!("unexpected shape with {} fields", fields.len()))),
        }
    }
}

fn encode_value(value: &FieldValue) -> Result<String, LineError> {
    let json = serde_json::to_vec(value).map_err(|e| LineError::Encoding(e.to_string()))?;
    Ok(BASE64.encode(json))
}

fn decode_value(field: &str) -> Result<FieldValue, LineError> {
    let json = BASE64
        .decode(field)
        .map_err(|e| malformed(format!("bad base64 value: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| malformed(format!("bad value json: {e}")))
}

fn parse_u64(field: &str) -> Result<u64, LineError> {
    field
        .parse()
        .map_err(|_| malformed(format!("bad integer '{field}'")))
}

fn parse_micros(field: &str) -> Result<DateTime<Utc>, LineError> {
    let micros: i64 = field
        .parse()
        .map_err(|_| malformed(format!("bad timestamp '{field}'")))?;
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| malformed(format!("timestamp out of range: {micros}")))
}

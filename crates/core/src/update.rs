//! Field-level update types carried by the write-ahead log

use crate::types::{Category, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Record field an update touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    /// `Record::title`
    Title,
    /// `Record::body`
    Body,
    /// `Record::category`
    Category,
    /// `Record::is_favorite`
    Favorite,
    /// `Record::tags`
    Tags,
    /// `Record::view_count`
    ViewCount,
    /// `Record::copy_count`
    CopyCount,
}

impl FieldName {
    /// Stable wire name
    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::Title => "title",
            FieldName::Body => "body",
            FieldName::Category => "category",
            FieldName::Favorite => "favorite",
            FieldName::Tags => "tags",
            FieldName::ViewCount => "view_count",
            FieldName::CopyCount => "copy_count",
        }
    }

    /// Whether a change to this field invalidates search and render caches.
    pub fn affects_text(self) -> bool {
        match self {
            FieldName::Title | FieldName::Body => true,
            FieldName::Category
            | FieldName::Favorite
            | FieldName::Tags
            | FieldName::ViewCount
            | FieldName::CopyCount => false,
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "title" => FieldName::Title,
            "body" => FieldName::Body,
            "category" => FieldName::Category,
            "favorite" => FieldName::Favorite,
            "tags" => FieldName::Tags,
            "view_count" => FieldName::ViewCount,
            "copy_count" => FieldName::CopyCount,
            other => return Err(format!("unknown field '{}'", other)),
        })
    }
}

/// Value of a field before or after an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Absent value
    Null,
    /// Text value (title, body)
    Text(String),
    /// Flag value (favorite)
    Bool(bool),
    /// Counter value (view/copy counts)
    Count(u64),
    /// Category value
    Category(Category),
    /// Tag set, sorted
    Tags(Vec<String>),
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<u64> for FieldValue {
    fn from(n: u64) -> Self {
        FieldValue::Count(n)
    }
}

impl From<Category> for FieldValue {
    fn from(c: Category) -> Self {
        FieldValue::Category(c)
    }
}

/// One pending change to one field of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    /// Record being changed
    pub record_id: RecordId,
    /// Field being changed
    pub field: FieldName,
    /// Value before the change
    pub old_value: FieldValue,
    /// Value after the change
    pub new_value: FieldValue,
    /// When the change was made
    pub timestamp: DateTime<Utc>,
}

impl FieldUpdate {
    /// Create an update stamped with the current time.
    pub fn new(
        record_id: RecordId,
        field: FieldName,
        old_value: impl Into<FieldValue>,
        new_value: impl Into<FieldValue>,
    ) -> Self {
        FieldUpdate {
            record_id,
            field,
            old_value: old_value.into(),
            new_value: new_value.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Handle returned by a log append; pass back to `mark_committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogToken(pub u64);

impl fmt::Display for LogToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

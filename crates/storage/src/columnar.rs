//! Structure-of-arrays hot index over record fields
//!
//! Each field lives in its own contiguous array, one slot per row. A scan
//! touching one field (a category filter) never loads the bytes of another.
//!
//! Text fields use a [`StringColumn`]: one byte buffer plus a fixed-width
//! `u32` offsets array, so the bytes of row `i` are
//! `bytes[offsets[i]..offsets[i + 1]]` and `fetch` is O(1). A column holds
//! at most `u32::MAX` bytes; an insert that would cross that fails with
//! `CapacityExceeded` and leaves the store unchanged.
//!
//! Row indices are stable until [`ColumnarStore::compact`].

use framestore_core::{Category, Error, RecordId, Result};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Handle of a row inside the columnar store
pub type RowIndex = usize;

/// Largest byte length a [`StringColumn`] can address
pub const MAX_COLUMN_BYTES: usize = u32::MAX as usize;

/// One record's projection, materialized from the columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnarRow {
    /// Record id
    pub id: RecordId,
    /// Title
    pub title: String,
    /// Body, or its preview when `max_content_bytes` is set
    pub content: String,
    /// Category
    pub category: Category,
}

/// Input to [`ColumnarStore::batch_insert`]
#[derive(Debug, Clone)]
pub struct RowInput {
    /// Record id
    pub id: RecordId,
    /// Title
    pub title: String,
    /// Body text
    pub content: String,
    /// Category
    pub category: Category,
}

// ============================================================================
// StringColumn
// ============================================================================

/// Variable-length strings packed into one buffer
#[derive(Debug, Clone)]
pub struct StringColumn {
    bytes: Vec<u8>,
    /// `len + 1` entries; `offsets[0] == 0`
    offsets: Vec<u32>,
}

impl Default for StringColumn {
    fn default() -> Self {
        StringColumn {
            bytes: Vec::new(),
            offsets: vec![0],
        }
    }
}

impl StringColumn {
    /// Number of strings
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Whether the column is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve room for `rows` more strings totalling `bytes` bytes
    pub fn reserve(&mut self, rows: usize, bytes: usize) {
        self.offsets.reserve(rows);
        self.bytes.reserve(bytes);
    }

    /// Bytes stored so far
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether `extra` more bytes keep the column within `limit`
    pub fn fits(&self, extra: usize, limit: usize) -> bool {
        self.bytes
            .len()
            .checked_add(extra)
            .is_some_and(|end| end <= limit.min(MAX_COLUMN_BYTES))
    }

    /// Append a string
    ///
    /// Fails without touching the column when the end offset would not fit
    /// in a `u32`.
    pub fn push(&mut self, s: &str) -> Result<()> {
        let end = self
            .bytes
            .len()
            .checked_add(s.len())
            .and_then(|end| u32::try_from(end).ok())
            .ok_or_else(|| overflow(self.bytes.len(), s.len()))?;
        self.bytes.extend_from_slice(s.as_bytes());
        self.offsets.push(end);
        Ok(())
    }

    /// Raw bytes of row `i`
    #[inline]
    pub fn get_bytes(&self, i: usize) -> Option<&[u8]> {
        let start = *self.offsets.get(i)? as usize;
        let end = *self.offsets.get(i + 1)? as usize;
        Some(&self.bytes[start..end])
    }

    /// String of row `i`
    #[inline]
    pub fn get(&self, i: usize) -> Option<&str> {
        // Every slice was pushed from a &str, so this cannot fail.
        self.get_bytes(i).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Heap bytes held
    pub fn heap_size(&self) -> usize {
        self.bytes.capacity() + self.offsets.capacity() * std::mem::size_of::<u32>()
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.offsets.clear();
        self.offsets.push(0);
    }
}

fn overflow(held: usize, extra: usize) -> Error {
    Error::CapacityExceeded(format!(
        "string column holds {} bytes, cannot add {}",
        held, extra
    ))
}

// ============================================================================
// Columns
// ============================================================================

#[derive(Debug, Default)]
struct Columns {
    ids: Vec<RecordId>,
    categories: Vec<Category>,
    titles: StringColumn,
    contents: StringColumn,
    removed: Vec<bool>,
    live: usize,
    row_of: FxHashMap<RecordId, RowIndex>,
}

impl Columns {
    fn check_room(&self, title_bytes: usize, content_bytes: usize, limit: usize) -> Result<()> {
        if !self.titles.fits(title_bytes, limit) {
            return Err(overflow(self.titles.byte_len(), title_bytes));
        }
        if !self.contents.fits(content_bytes, limit) {
            return Err(overflow(self.contents.byte_len(), content_bytes));
        }
        Ok(())
    }

    /// Callers run `check_room` first, so both pushes succeed together.
    fn append(&mut self, id: RecordId, title: &str, content: &str, category: Category) -> Result<RowIndex> {
        self.titles.push(title)?;
        self.contents.push(content)?;
        let row = self.ids.len();
        self.ids.push(id);
        self.categories.push(category);
        self.removed.push(false);
        self.live += 1;
        self.row_of.insert(id, row);
        Ok(row)
    }

    fn row(&self, row: RowIndex) -> Option<ColumnarRow> {
        if *self.removed.get(row)? {
            return None;
        }
        Some(ColumnarRow {
            id: self.ids[row],
            title: self.titles.get(row)?.to_string(),
            content: self.contents.get(row)?.to_string(),
            category: self.categories[row],
        })
    }
}

// ============================================================================
// ColumnarStore
// ============================================================================

/// Columnar projection of the record set
///
/// # Thread Safety
///
/// One `RwLock` guards all columns: inserts serialize, reads run concurrently.
#[derive(Debug)]
pub struct ColumnarStore {
    columns: RwLock<Columns>,
    max_content_bytes: Option<usize>,
    max_column_bytes: usize,
}

impl Default for ColumnarStore {
    fn default() -> Self {
        ColumnarStore {
            columns: RwLock::new(Columns::default()),
            max_content_bytes: None,
            max_column_bytes: MAX_COLUMN_BYTES,
        }
    }
}

impl ColumnarStore {
    /// Store full content
    pub fn new() -> Self {
        Self::default()
    }

    /// Store at most `max` bytes of content per row (cut at a char boundary)
    pub fn with_content_limit(max: usize) -> Self {
        ColumnarStore {
            max_content_bytes: Some(max),
            ..Self::default()
        }
    }

    #[cfg(test)]
    fn with_column_limit(max_column_bytes: usize) -> Self {
        ColumnarStore {
            max_column_bytes,
            ..Self::default()
        }
    }

    fn clip<'a>(&self, content: &'a str) -> &'a str {
        match self.max_content_bytes {
            Some(max) if content.len() > max => {
                let mut end = max;
                while !content.is_char_boundary(end) {
                    end -= 1;
                }
                &content[..end]
            }
            _ => content,
        }
    }

    /// Append one row
    pub fn insert(&self, id: RecordId, title: &str, content: &str, category: Category) -> Result<RowIndex> {
        let content = self.clip(content);
        let mut cols = self.columns.write();
        cols.check_room(title.len(), content.len(), self.max_column_bytes)?;
        cols.append(id, title, content, category)
    }

    /// Append many rows in one capacity-checked pass.
    ///
    /// Either every row lands or none does.
    pub fn batch_insert(&self, items: &[RowInput]) -> Result<Vec<RowIndex>> {
        let clipped: Vec<&str> = items.iter().map(|i| self.clip(&i.content)).collect();
        let title_bytes = items
            .iter()
            .try_fold(0usize, |acc, i| acc.checked_add(i.title.len()))
            .unwrap_or(usize::MAX);
        let content_bytes = clipped
            .iter()
            .try_fold(0usize, |acc, c| acc.checked_add(c.len()))
            .unwrap_or(usize::MAX);

        let mut cols = self.columns.write();
        cols.check_room(title_bytes, content_bytes, self.max_column_bytes)?;
        let n = items.len();
        cols.ids.reserve(n);
        cols.categories.reserve(n);
        cols.removed.reserve(n);
        cols.row_of.reserve(n);
        cols.titles.reserve(n, title_bytes);
        cols.contents.reserve(n, content_bytes);

        // check_room covered the whole batch, so no append below fails
        // halfway through.

        items
            .iter()
            .zip(clipped)
            .map(|(item, content)| cols.append(item.id, &item.title, content, item.category))
            .collect()
    }

    /// Materialize row `row` in O(1). `None` if out of range or removed.
    pub fn fetch(&self, row: RowIndex) -> Option<ColumnarRow> {
        self.columns.read().row(row)
    }

    /// Latest row holding `id`
    pub fn row_of(&self, id: &RecordId) -> Option<RowIndex> {
        let cols = self.columns.read();
        cols.row_of
            .get(id)
            .copied()
            .filter(|&r| !cols.removed[r])
    }

    /// Rows of `category`, scanning only the category column
    pub fn filter_by_category(&self, category: Category) -> Vec<RowIndex> {
        let cols = self.columns.read();
        cols.categories
            .iter()
            .zip(&cols.removed)
            .enumerate()
            .filter(|(_, (c, removed))| **c == category && !**removed)
            .map(|(row, _)| row)
            .collect()
    }

    /// Linear case-insensitive substring scan over titles and contents.
    ///
    /// Slower than the inverted index per call, but never stale.
    pub fn search(&self, needle: &str) -> Vec<RowIndex> {
        if needle.is_empty() {
            return Vec::new();
        }
        let cols = self.columns.read();
        let matcher = Matcher::new(needle);
        (0..cols.ids.len())
            .filter(|&row| !cols.removed[row])
            .filter(|&row| {
                cols.titles.get_bytes(row).is_some_and(|t| matcher.matches(t))
                    || cols.contents.get_bytes(row).is_some_and(|c| matcher.matches(c))
            })
            .collect()
    }

    /// Tombstone a row; its index stays reserved until `compact`.
    pub fn remove(&self, row: RowIndex) -> bool {
        let mut cols = self.columns.write();
        match cols.removed.get(row) {
            Some(false) => {
                cols.removed[row] = true;
                cols.live -= 1;
                let id = cols.ids[row];
                if cols.row_of.get(&id) == Some(&row) {
                    cols.row_of.remove(&id);
                }
                true
            }
            _ => false,
        }
    }

    /// Rewrite the columns without removed rows.
    ///
    /// Returns a remap table: `remap[old] == Some(new)` for surviving rows.
    /// On error the old columns stay in place.
    pub fn compact(&self) -> Result<Vec<Option<RowIndex>>> {
        let mut cols = self.columns.write();
        let mut fresh = Columns::default();
        let mut remap = Vec::with_capacity(cols.ids.len());
        fresh.ids.reserve(cols.live);
        fresh.categories.reserve(cols.live);
        fresh.removed.reserve(cols.live);
        for row in 0..cols.ids.len() {
            if cols.removed[row] {
                remap.push(None);
                continue;
            }
            let new_row = fresh.append(
                cols.ids[row],
                cols.titles.get(row).unwrap_or_default(),
                cols.contents.get(row).unwrap_or_default(),
                cols.categories[row],
            )?;
            remap.push(Some(new_row));
        }
        *cols = fresh;
        Ok(remap)
    }

    /// Live rows
    pub fn len(&self) -> usize {
        self.columns.read().live
    }

    /// Whether there are no live rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Heap bytes held by the columns
    pub fn memory_usage(&self) -> usize {
        let cols = self.columns.read();
        cols.ids.capacity() * std::mem::size_of::<RecordId>()
            + cols.categories.capacity() * std::mem::size_of::<Category>()
            + cols.removed.capacity()
            + cols.titles.heap_size()
            + cols.contents.heap_size()
    }

    /// Drop every row
    pub fn clear(&self) {
        let mut cols = self.columns.write();
        cols.ids.clear();
        cols.categories.clear();
        cols.removed.clear();
        cols.titles.clear();
        cols.contents.clear();
        cols.row_of.clear();
        cols.live = 0;
    }
}

// ============================================================================
// Substring matching
// ============================================================================

enum Matcher {
    /// ASCII needle: compare bytes ignoring ASCII case, no allocation
    Ascii(Vec<u8>),
    /// Non-ASCII needle: lowercase both sides
    Unicode(String),
}

impl Matcher {
    fn new(needle: &str) -> Self {
        if needle.is_ascii() {
            Matcher::Ascii(needle.as_bytes().to_ascii_lowercase())
        } else {
            Matcher::Unicode(needle.to_lowercase())
        }
    }

    fn matches(&self, hay: &[u8]) -> bool {
        match self {
            Matcher::Ascii(needle) => contains_ignore_ascii_case(hay, needle),
            Matcher::Unicode(needle) => std::str::from_utf8(hay)
                .map(|h| h.to_lowercase().contains(needle.as_str()))
                .unwrap_or(false),
        }
    }
}

fn contains_ignore_ascii_case(hay: &[u8], needle: &[u8]) -> bool {
    if needle.len() > hay.len() {
        return false;
    }
    let first = needle[0];
    hay.windows(needle.len()).any(|w| {
        w[0].to_ascii_lowercase() == first
            && w.iter()
                .zip(needle)
                .all(|(a, b)| a.to_ascii_lowercase() == *b)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(title: &str, content: &str, category: Category) -> RowInput {
        RowInput {
            id: RecordId::new(),
            title: title.to_string(),
            content: content.to_string(),
            category,
        }
    }

    #[test]
    fn test_insert_and_fetch() {
        let store = ColumnarStore::new();
        let id = RecordId::new();
        let row = store.insert(id, "Title", "Body", Category::Code).unwrap();
        assert_eq!(row, 0);
        let fetched = store.fetch(row).unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.title, "Title");
        assert_eq!(fetched.content, "Body");
        assert_eq!(fetched.category, Category::Code);
        assert!(store.fetch(1).is_none());
    }

    #[test]
    fn test_batch_insert_returns_sequential_rows() {
        let store = ColumnarStore::new();
        store.insert(RecordId::new(), "first", "", Category::Note).unwrap();
        let rows = store
            .batch_insert(&[
                input("a", "1", Category::Note),
                input("b", "2", Category::Link),
            ])
            .unwrap();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(store.fetch(2).unwrap().title, "b");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_filter_by_category() {
        let store = ColumnarStore::new();
        store
            .batch_insert(&[
                input("a", "", Category::Code),
                input("b", "", Category::Note),
                input("c", "", Category::Code),
            ])
            .unwrap();
        assert_eq!(store.filter_by_category(Category::Code), vec![0, 2]);
        assert!(store.filter_by_category(Category::Checklist).is_empty());
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let store = ColumnarStore::new();
        store
            .batch_insert(&[
                input("Rust Tips", "borrowck", Category::Note),
                input("Shopping", "milk, EGGS", Category::Checklist),
                input("Straße", "München", Category::Note),
            ])
            .unwrap();
        assert_eq!(store.search("rust"), vec![0]);
        assert_eq!(store.search("eggs"), vec![1]);
        assert_eq!(store.search("MÜNCHEN"), vec![2]);
        assert!(store.search("absent").is_empty());
        assert!(store.search("").is_empty());
    }

    #[test]
    fn test_content_limit_cuts_at_char_boundary() {
        let store = ColumnarStore::with_content_limit(3);
        let row = store.insert(RecordId::new(), "t", "aéb", Category::Note).unwrap();
        // 'é' spans bytes 1..3, so a 3-byte cut keeps "aé"
        assert_eq!(store.fetch(row).unwrap().content, "aé");
        let row = store.insert(RecordId::new(), "t", "aaé", Category::Note).unwrap();
        assert_eq!(store.fetch(row).unwrap().content, "aa");
    }

    #[test]
    fn test_remove_and_compact() {
        let store = ColumnarStore::new();
        let items = vec![
            input("a", "", Category::Note),
            input("b", "", Category::Note),
            input("c", "", Category::Note),
        ];
        let id_c = items[2].id;
        store.batch_insert(&items).unwrap();

        assert!(store.remove(1));
        assert!(!store.remove(1));
        assert!(store.fetch(1).is_none());
        assert_eq!(store.len(), 2);
        assert_eq!(store.filter_by_category(Category::Note), vec![0, 2]);

        let remap = store.compact().unwrap();
        assert_eq!(remap, vec![Some(0), None, Some(1)]);
        assert_eq!(store.fetch(1).unwrap().title, "c");
        assert_eq!(store.row_of(&id_c), Some(1));
    }

    #[test]
    fn test_clear() {
        let store = ColumnarStore::new();
        store.insert(RecordId::new(), "a", "b", Category::Other).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.fetch(0).is_none());
        let row = store.insert(RecordId::new(), "x", "y", Category::Other).unwrap();
        assert_eq!(row, 0);
    }

    #[test]
    fn test_fits_respects_u32_offsets() {
        let mut column = StringColumn::default();
        column.push("abc").unwrap();
        assert!(column.fits(10, MAX_COLUMN_BYTES));
        assert!(column.fits(MAX_COLUMN_BYTES - 3, usize::MAX));
        assert!(!column.fits(MAX_COLUMN_BYTES - 2, usize::MAX));
        assert!(!column.fits(usize::MAX, usize::MAX));
        assert!(!column.fits(2, 4));
    }

    #[test]
    fn test_batch_over_column_limit_inserts_nothing() {
        let store = ColumnarStore::with_column_limit(16);
        store.insert(RecordId::new(), "title", "0123456789", Category::Note).unwrap();

        let err = store
            .batch_insert(&[
                input("a", "0123", Category::Note),
                input("b", "0123", Category::Note),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
        assert_eq!(store.len(), 1);
        assert!(store.fetch(1).is_none());

        let err = store
            .insert(RecordId::new(), "0123456789abcdef", "", Category::Note)
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));

        // Rows that still fit keep working and read back intact.
        let rows = store
            .batch_insert(&[input("c", "012", Category::Code), input("d", "345", Category::Code)])
            .unwrap();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(store.fetch(0).unwrap().content, "0123456789");
        assert_eq!(store.fetch(2).unwrap().content, "345");
    }

    #[test]
    fn test_compact_keeps_column_limit() {
        let store = ColumnarStore::with_column_limit(8);
        store
            .batch_insert(&[input("a", "1234", Category::Note), input("b", "5678", Category::Note)])
            .unwrap();
        store.remove(0);
        store.compact().unwrap();
        store.insert(RecordId::new(), "c", "abcd", Category::Note).unwrap();
        let err = store
            .insert(RecordId::new(), "d", "efgh", Category::Note)
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
    }
}

//! Boundary to the external record store.

use framestore_core::{Record, RecordId, Result};
use parking_lot::RwLock;

/// Supplies record snapshots to the engine.
///
/// Implemented by the persistent store that owns the records. The engine
/// only reads through this trait.
pub trait RecordSource: Send + Sync {
    /// Every record currently in the store.
    fn load_all(&self) -> Result<Vec<Record>>;

    /// Body of one record, `None` if it no longer exists.
    fn content(&self, id: &RecordId) -> Result<Option<String>>;
}

/// In-memory source, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: RwLock<Vec<Record>>,
}

impl MemorySource {
    /// Source over `records`
    pub fn new(records: Vec<Record>) -> Self {
        MemorySource {
            records: RwLock::new(records),
        }
    }

    /// Replace or add a record by id
    pub fn upsert(&self, record: Record) {
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Remove a record; returns whether it existed
    pub fn remove(&self, id: &RecordId) -> bool {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| &r.id != id);
        records.len() != before
    }
}

impl RecordSource for MemorySource {
    fn load_all(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().clone())
    }

    fn content(&self, id: &RecordId) -> Result<Option<String>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| &r.id == id)
            .map(|r| r.body.clone()))
    }
}

//! In-memory wanted catalog for testing.

use std::sync::RwLock;

use crate::catalog::{CatalogError, WantedCatalog, WantedRecord};
use crate::task::AlbumProgress;

/// Records kept in insertion order; `list_unresolved` returns the newest
/// first like the SQLite catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: RwLock<Vec<WantedRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<WantedRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn insert(&self, record: WantedRecord) {
        if let Ok(mut records) = self.records.write() {
            records.retain(|r| r.id != record.id);
            records.push(record);
        }
    }

    pub fn progress(&self, id: &str) -> Option<AlbumProgress> {
        self.records
            .read()
            .ok()?
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.progress)
    }
}

impl WantedCatalog for MemoryCatalog {
    fn list_unresolved(&self, limit: usize) -> Result<Vec<WantedRecord>, CatalogError> {
        let records = self
            .records
            .read()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        let mut unresolved: Vec<WantedRecord> =
            records.iter().filter(|r| r.is_unresolved()).cloned().collect();
        unresolved.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        unresolved.truncate(limit);
        Ok(unresolved)
    }

    fn get(&self, id: &str) -> Result<Option<WantedRecord>, CatalogError> {
        let records = self
            .records
            .read()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    fn set_progress(&self, id: &str, progress: AlbumProgress) -> Result<(), CatalogError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        record.progress = progress;
        Ok(())
    }
}

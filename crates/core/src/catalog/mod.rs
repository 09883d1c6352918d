//! The wanted catalog: artists and albums the pipeline should acquire.
//!
//! Records are filled by the catalog-sync side; the pipeline only reads the
//! unresolved ones and writes back a coarse progress tag.

mod sqlite;
mod types;

pub use sqlite::SqliteWantedCatalog;
pub use types::*;

use crate::task::AlbumProgress;

/// Source of wanted records.
pub trait WantedCatalog: Send + Sync {
    /// Records whose progress is not `downloaded`, newest first.
    fn list_unresolved(&self, limit: usize) -> Result<Vec<WantedRecord>, CatalogError>;

    fn get(&self, id: &str) -> Result<Option<WantedRecord>, CatalogError>;

    /// Persist the progress tag of a record.
    fn set_progress(&self, id: &str, progress: AlbumProgress) -> Result<(), CatalogError>;
}

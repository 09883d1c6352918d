//! SQLite-backed wanted catalog.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::{CatalogError, WantedCatalog, WantedRecord};
use crate::task::AlbumProgress;

const COLUMNS: &str =
    "id, scope, artist, album, year, ext_artist_id, ext_album_id, progress, created_at";

/// Wanted records in the `wanted_albums` table.
pub struct SqliteWantedCatalog {
    conn: Mutex<Connection>,
}

impl SqliteWantedCatalog {
    pub fn new(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, CatalogError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CatalogError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CatalogError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wanted_albums (
                id TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT,
                year INTEGER,
                ext_artist_id TEXT,
                ext_album_id TEXT,
                progress TEXT NOT NULL DEFAULT 'none',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_wanted_progress ON wanted_albums(progress);
            CREATE INDEX IF NOT EXISTS idx_wanted_created ON wanted_albums(created_at);
            "#,
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::Database("connection lock poisoned".to_string()))
    }

    /// Insert or replace a record. Progress is kept when the row exists.
    pub fn upsert(&self, record: &WantedRecord) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wanted_albums (id, scope, artist, album, year, ext_artist_id, ext_album_id, progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                scope = excluded.scope,
                artist = excluded.artist,
                album = excluded.album,
                year = excluded.year,
                ext_artist_id = excluded.ext_artist_id,
                ext_album_id = excluded.ext_album_id",
            params![
                record.id,
                record.scope.as_str(),
                record.artist,
                record.album,
                record.year,
                record.ext_artist_id,
                record.ext_album_id,
                record.progress.as_str(),
                record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(|e| CatalogError::Database(e.to_string()))?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<WantedRecord> {
        let scope: String = row.get(1)?;
        let progress: String = row.get(7)?;
        let created_at: String = row.get(8)?;

        Ok(WantedRecord {
            id: row.get(0)?,
            scope: scope.parse().map_err(|e| conversion_error(1, e))?,
            artist: row.get(2)?,
            album: row.get(3)?,
            year: row.get(4)?,
            ext_artist_id: row.get(5)?,
            ext_album_id: row.get(6)?,
            progress: progress.parse().map_err(|e| conversion_error(7, e))?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| conversion_error(8, e))?,
        })
    }
}

fn conversion_error<E>(idx: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error))
}

impl WantedCatalog for SqliteWantedCatalog {
    fn list_unresolved(&self, limit: usize) -> Result<Vec<WantedRecord>, CatalogError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM wanted_albums WHERE progress != ?1
                 ORDER BY created_at DESC, id ASC LIMIT ?2",
                COLUMNS
            ))
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![AlbumProgress::Downloaded.as_str(), limit as i64],
                Self::row_to_record,
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CatalogError::Database(e.to_string()))
    }

    fn get(&self, id: &str) -> Result<Option<WantedRecord>, CatalogError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM wanted_albums WHERE id = ?1", COLUMNS),
            params![id],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| CatalogError::Database(e.to_string()))
    }

    fn set_progress(&self, id: &str, progress: AlbumProgress) -> Result<(), CatalogError> {
        let conn = self.conn()?;
        let updated = conn
            .execute(
                "UPDATE wanted_albums SET progress = ?1 WHERE id = ?2",
                params![progress.as_str(), id],
            )
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn seeded() -> SqliteWantedCatalog {
        let catalog = SqliteWantedCatalog::in_memory().unwrap();
        catalog
            .upsert(&WantedRecord::album("a", "Kino", "Gruppa Krovi", Some(1988), at(1)))
            .unwrap();
        catalog
            .upsert(&WantedRecord::album("b", "Kino", "Zvezda", Some(1989), at(3)))
            .unwrap();
        catalog.upsert(&WantedRecord::artist("c", "Aquarium", at(2))).unwrap();
        catalog
    }

    #[test]
    fn test_list_unresolved_newest_first() {
        let catalog = seeded();
        let ids: Vec<String> = catalog
            .list_unresolved(10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        assert_eq!(catalog.list_unresolved(1).unwrap().len(), 1);
    }

    #[test]
    fn test_downloaded_records_are_resolved() {
        let catalog = seeded();
        catalog.set_progress("b", AlbumProgress::Downloaded).unwrap();
        catalog.set_progress("a", AlbumProgress::Downloading).unwrap();

        let records = catalog.list_unresolved(10).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(records[1].progress, AlbumProgress::Downloading);
    }

    #[test]
    fn test_upsert_keeps_progress() {
        let catalog = seeded();
        catalog.set_progress("a", AlbumProgress::Found).unwrap();

        let mut changed = WantedRecord::album("a", "Kino", "Gruppa Krovi (Remaster)", None, at(1));
        changed.ext_album_id = Some("mbid-1".to_string());
        catalog.upsert(&changed).unwrap();

        let record = catalog.get("a").unwrap().unwrap();
        assert_eq!(record.album.as_deref(), Some("Gruppa Krovi (Remaster)"));
        assert_eq!(record.year, None);
        assert_eq!(record.ext_album_id.as_deref(), Some("mbid-1"));
        assert_eq!(record.progress, AlbumProgress::Found);
        assert_eq!(record.created_at, at(1));
    }

    #[test]
    fn test_set_progress_unknown_record() {
        let catalog = seeded();
        let err = catalog
            .set_progress("missing", AlbumProgress::Found)
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }
}

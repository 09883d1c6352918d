//! SQLite-backed indexer store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::IndexerConfig;

use super::{Indexer, IndexerError, IndexerHealth, IndexerStore};

const COLUMNS: &str = "id, name, base_url, api_key, enabled, categories, sort_order, \
     error_count, temp_disabled_until, last_error";

pub struct SqliteIndexerStore {
    conn: Mutex<Connection>,
}

impl SqliteIndexerStore {
    pub fn new(path: &Path) -> Result<Self, IndexerError> {
        let conn = Connection::open(path).map_err(|e| IndexerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, IndexerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| IndexerError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), IndexerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS indexers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                base_url TEXT NOT NULL,
                api_key TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                categories TEXT NOT NULL DEFAULT '',
                sort_order INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                temp_disabled_until TEXT,
                last_error TEXT
            );
            "#,
        )
        .map_err(|e| IndexerError::Database(e.to_string()))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, IndexerError> {
        self.conn
            .lock()
            .map_err(|_| IndexerError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_indexer(row: &rusqlite::Row) -> rusqlite::Result<Indexer> {
        let categories: String = row.get(5)?;
        let until: Option<String> = row.get(8)?;

        Ok(Indexer {
            id: row.get(0)?,
            name: row.get(1)?,
            base_url: row.get(2)?,
            api_key: row.get(3)?,
            enabled: row.get(4)?,
            categories: categories
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
            order: row.get(6)?,
            error_count: row.get(7)?,
            temp_disabled_until: until
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            last_error: row.get(9)?,
        })
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Indexer>, IndexerError> {
        conn.query_row(
            &format!("SELECT {} FROM indexers WHERE id = ?", COLUMNS),
            params![id],
            Self::row_to_indexer,
        )
        .optional()
        .map_err(|e| IndexerError::Database(e.to_string()))
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl IndexerStore for SqliteIndexerStore {
    fn list_all(&self) -> Result<Vec<Indexer>, IndexerError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM indexers ORDER BY sort_order ASC, id ASC",
                COLUMNS
            ))
            .map_err(|e| IndexerError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], Self::row_to_indexer)
            .map_err(|e| IndexerError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| IndexerError::Database(e.to_string()))
    }

    fn get(&self, id: i64) -> Result<Option<Indexer>, IndexerError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn upsert_config(&self, config: &IndexerConfig) -> Result<Indexer, IndexerError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO indexers (name, base_url, api_key, enabled, categories, sort_order) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(name) DO UPDATE SET base_url = ?2, api_key = ?3, categories = ?5, \
             sort_order = ?6",
            params![
                config.name,
                config.base_url,
                config.api_key,
                config.enabled,
                config.categories.join(","),
                config.order,
            ],
        )
        .map_err(|e| IndexerError::Database(e.to_string()))?;

        conn.query_row(
            &format!("SELECT {} FROM indexers WHERE name = ?", COLUMNS),
            params![config.name],
            Self::row_to_indexer,
        )
        .map_err(|e| IndexerError::Database(e.to_string()))
    }

    fn set_health(&self, id: i64, health: &IndexerHealth) -> Result<Indexer, IndexerError> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE indexers SET enabled = ?, error_count = ?, temp_disabled_until = ?, \
                 last_error = ? WHERE id = ?",
                params![
                    health.enabled,
                    health.error_count,
                    health.temp_disabled_until.map(format_timestamp),
                    health.last_error,
                    id,
                ],
            )
            .map_err(|e| IndexerError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(IndexerError::NotFound(id));
        }

        Self::fetch(&conn, id)?.ok_or(IndexerError::NotFound(id))
    }

    fn set_enabled(&self, id: i64, enabled: bool) -> Result<Indexer, IndexerError> {
        let conn = self.conn()?;

        let sql = if enabled {
            "UPDATE indexers SET enabled = 1, error_count = 0, temp_disabled_until = NULL, \
             last_error = NULL WHERE id = ?"
        } else {
            "UPDATE indexers SET enabled = 0 WHERE id = ?"
        };

        let changed = conn
            .execute(sql, params![id])
            .map_err(|e| IndexerError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(IndexerError::NotFound(id));
        }

        Self::fetch(&conn, id)?.ok_or(IndexerError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_upsert_config_inserts_and_updates_by_name() {
        let store = SqliteIndexerStore::in_memory().unwrap();

        let first = store
            .upsert_config(&fixtures::indexer_config("rutracker", 1))
            .unwrap();
        assert!(first.enabled);
        assert_eq!(first.error_count, 0);
        assert_eq!(first.categories, vec!["3000".to_string()]);

        let mut changed = fixtures::indexer_config("rutracker", 5);
        changed.base_url = "http://jackett:9117/api/v2.0/indexers/rutracker/results/torznab".into();
        let second = store.upsert_config(&changed).unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.order, 5);
        assert!(second.base_url.contains("jackett:9117"));
    }

    #[test]
    fn test_upsert_config_preserves_health() {
        let store = SqliteIndexerStore::in_memory().unwrap();
        let indexer = store
            .upsert_config(&fixtures::indexer_config("a", 0))
            .unwrap();

        store
            .set_health(
                indexer.id,
                &IndexerHealth {
                    enabled: false,
                    error_count: 20,
                    temp_disabled_until: None,
                    last_error: Some("HTTP 500".to_string()),
                },
            )
            .unwrap();

        let reseeded = store
            .upsert_config(&fixtures::indexer_config("a", 0))
            .unwrap();
        assert!(!reseeded.enabled);
        assert_eq!(reseeded.error_count, 20);
        assert_eq!(reseeded.last_error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_list_all_orders_by_order_then_id() {
        let store = SqliteIndexerStore::in_memory().unwrap();
        store.upsert_config(&fixtures::indexer_config("c", 2)).unwrap();
        store.upsert_config(&fixtures::indexer_config("a", 1)).unwrap();
        store.upsert_config(&fixtures::indexer_config("b", 1)).unwrap();

        let names: Vec<_> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_set_enabled_resets_counters() {
        let store = SqliteIndexerStore::in_memory().unwrap();
        let indexer = store
            .upsert_config(&fixtures::indexer_config("a", 0))
            .unwrap();
        store
            .set_health(
                indexer.id,
                &IndexerHealth {
                    enabled: false,
                    error_count: 25,
                    temp_disabled_until: Some(Utc::now()),
                    last_error: Some("boom".into()),
                },
            )
            .unwrap();

        let enabled = store.set_enabled(indexer.id, true).unwrap();
        assert!(enabled.enabled);
        assert_eq!(enabled.error_count, 0);
        assert_eq!(enabled.temp_disabled_until, None);
        assert_eq!(enabled.last_error, None);

        assert!(matches!(
            store.set_enabled(999, true),
            Err(IndexerError::NotFound(999))
        ));
    }
}

//! SQLite-backed task and release store.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::clock::{Clock, SystemClock};

use super::{
    CreateTaskRequest, CreatedTask, NewRelease, Release, ReleaseStatus, ReleaseStore, Task,
    TaskError, TaskFilter, TaskPatch, TaskStatus, TaskStore,
};

const TASK_COLUMNS: &str = "id, dedup_key, scope, artist, album, year, query, ext_artist_id, \
     ext_album_id, source, collision_policy, min_seeders, max_releases_per_indexer, \
     preferred_indexer_id, target_path, status, transfer_hash, layout, final_path, last_error, \
     created_at, updated_at, started_at, finished_at, last_tried_at, scheduled_at";

const RELEASE_COLUMNS: &str = "seq, id, task_id, indexer_id, title, guid, link, magnet, \
     info_hash, size_bytes, seeders, leechers, published_at, quality, category, external_score, \
     score, status, created_at";

/// SQLite-backed store for tasks and their releases.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteTaskStore {
    /// Open or create the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = Connection::open_in_memory().map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
        })
    }

    /// Use `clock` for `created_at`/`updated_at` stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                dedup_key TEXT NOT NULL UNIQUE,
                scope TEXT NOT NULL,
                artist TEXT,
                album TEXT,
                year INTEGER,
                query TEXT,
                ext_artist_id TEXT,
                ext_album_id TEXT,
                source TEXT NOT NULL,
                collision_policy TEXT NOT NULL,
                min_seeders INTEGER,
                max_releases_per_indexer INTEGER,
                preferred_indexer_id INTEGER,
                target_path TEXT,
                status TEXT NOT NULL,
                transfer_hash TEXT,
                layout TEXT,
                final_path TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                last_tried_at TEXT,
                scheduled_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_transfer_hash
                ON tasks(transfer_hash) WHERE transfer_hash IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at);

            CREATE TABLE IF NOT EXISTS releases (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                indexer_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                guid TEXT,
                link TEXT,
                magnet TEXT,
                info_hash TEXT,
                size_bytes INTEGER,
                seeders INTEGER,
                leechers INTEGER,
                published_at TEXT,
                quality TEXT,
                category TEXT,
                external_score REAL,
                score REAL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_releases_task ON releases(task_id);
            "#,
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        Ok(Task {
            id: row.get(0)?,
            dedup_key: row.get(1)?,
            scope: parse_column(row, 2)?,
            artist: row.get(3)?,
            album: row.get(4)?,
            year: row.get(5)?,
            query: row.get(6)?,
            ext_artist_id: row.get(7)?,
            ext_album_id: row.get(8)?,
            source: parse_column(row, 9)?,
            collision_policy: parse_column(row, 10)?,
            min_seeders: row.get(11)?,
            max_releases_per_indexer: row.get(12)?,
            preferred_indexer_id: row.get(13)?,
            target_path: row.get(14)?,
            status: parse_column(row, 15)?,
            transfer_hash: row.get(16)?,
            layout: parse_optional_column(row, 17)?,
            final_path: row.get(18)?,
            last_error: row.get(19)?,
            created_at: timestamp_column(row, 20)?,
            updated_at: timestamp_column(row, 21)?,
            started_at: optional_timestamp_column(row, 22)?,
            finished_at: optional_timestamp_column(row, 23)?,
            last_tried_at: optional_timestamp_column(row, 24)?,
            scheduled_at: optional_timestamp_column(row, 25)?,
        })
    }

    fn row_to_release(row: &rusqlite::Row) -> rusqlite::Result<Release> {
        Ok(Release {
            seq: row.get(0)?,
            id: row.get(1)?,
            task_id: row.get(2)?,
            indexer_id: row.get(3)?,
            title: row.get(4)?,
            guid: row.get(5)?,
            link: row.get(6)?,
            magnet: row.get(7)?,
            info_hash: row.get(8)?,
            size_bytes: row.get(9)?,
            seeders: row.get(10)?,
            leechers: row.get(11)?,
            published_at: optional_timestamp_column(row, 12)?,
            quality: row.get(13)?,
            category: row.get(14)?,
            external_score: row.get(15)?,
            score: row.get(16)?,
            status: parse_column(row, 17)?,
            created_at: timestamp_column(row, 18)?,
        })
    }

    fn fetch_task(conn: &Connection, id: &str) -> Result<Option<Task>, TaskError> {
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS),
            params![id],
            Self::row_to_task,
        )
        .optional()
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn fetch_by_dedup_key(conn: &Connection, key: &str) -> Result<Option<Task>, TaskError> {
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE dedup_key = ?", TASK_COLUMNS),
            params![key],
            Self::row_to_task,
        )
        .optional()
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn fetch_release(conn: &Connection, id: &str) -> Result<Option<Release>, TaskError> {
        conn.query_row(
            &format!("SELECT {} FROM releases WHERE id = ?", RELEASE_COLUMNS),
            params![id],
            Self::row_to_release,
        )
        .optional()
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    /// Check that `task` may hold its fields in its status.
    fn check_required_fields(task: &Task) -> Result<(), TaskError> {
        let missing = match task.status {
            TaskStatus::Moved if task.final_path.is_none() => Some("final_path"),
            TaskStatus::Added | TaskStatus::Downloading if task.transfer_hash.is_none() => {
                Some("transfer_hash")
            }
            _ => None,
        };

        match missing {
            Some(field) => Err(TaskError::MissingField {
                task_id: task.id.clone(),
                status: task.status,
                field,
            }),
            None => Ok(()),
        }
    }

    /// Fail when another task already owns `task.transfer_hash`.
    fn check_hash_owner(conn: &Connection, task: &Task) -> Result<(), TaskError> {
        let Some(hash) = task.transfer_hash.as_deref() else {
            return Ok(());
        };

        let owner: Option<String> = conn
            .query_row(
                "SELECT id FROM tasks WHERE transfer_hash = ? AND id != ?",
                params![hash, task.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| TaskError::Database(e.to_string()))?;

        match owner {
            Some(existing_task_id) => Err(TaskError::DuplicateHash {
                hash: hash.to_string(),
                existing_task_id,
            }),
            None => Ok(()),
        }
    }

    fn write_runtime(conn: &Connection, task: &Task) -> Result<(), TaskError> {
        let changed = conn
            .execute(
                "UPDATE tasks SET status = ?, transfer_hash = ?, layout = ?, final_path = ?, \
                 last_error = ?, updated_at = ?, started_at = ?, finished_at = ?, \
                 last_tried_at = ?, scheduled_at = ? WHERE id = ?",
                params![
                    task.status.as_str(),
                    task.transfer_hash,
                    task.layout.map(|l| l.as_str()),
                    task.final_path,
                    task.last_error,
                    format_timestamp(task.updated_at),
                    task.started_at.map(format_timestamp),
                    task.finished_at.map(format_timestamp),
                    task.last_tried_at.map(format_timestamp),
                    task.scheduled_at.map(format_timestamp),
                    task.id,
                ],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(TaskError::NotFound(task.id.clone()));
        }
        Ok(())
    }

    fn apply_update(
        &self,
        id: &str,
        status: Option<TaskStatus>,
        patch: TaskPatch,
    ) -> Result<Task, TaskError> {
        let conn = self.conn()?;

        let current = Self::fetch_task(&conn, id)?.ok_or_else(|| TaskError::NotFound(id.into()))?;

        let mut next = current.clone();
        if let Some(status) = status {
            if !current.status.can_transition_to(status) {
                return Err(TaskError::InvalidTransition {
                    task_id: id.to_string(),
                    from: current.status,
                    to: status,
                });
            }
            next.status = status;
        }
        patch.apply(&mut next);
        next.updated_at = self.clock.now();

        Self::check_required_fields(&next)?;
        if next.transfer_hash != current.transfer_hash {
            Self::check_hash_owner(&conn, &next)?;
        }
        Self::write_runtime(&conn, &next)?;

        if next.status != current.status {
            debug!(
                task_id = %id,
                from = %current.status,
                to = %next.status,
                "Task status changed"
            );
        }

        Ok(next)
    }

    fn find_release_match(
        conn: &Connection,
        task_id: &str,
        release: &NewRelease,
    ) -> Result<Option<String>, TaskError> {
        let keys: [(&str, Option<&str>); 3] = [
            ("guid", release.guid.as_deref()),
            ("info_hash", release.info_hash.as_deref()),
            ("title", Some(release.title.as_str())),
        ];

        for (column, value) in keys {
            let Some(value) = value.filter(|v| !v.is_empty()) else {
                continue;
            };
            let found: Option<String> = conn
                .query_row(
                    &format!(
                        "SELECT id FROM releases WHERE task_id = ? AND {} = ? ORDER BY seq LIMIT 1",
                        column
                    ),
                    params![task_id, value],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| TaskError::Database(e.to_string()))?;
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, error: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(error))
}

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn parse_optional_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| value.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_timestamp_column(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

impl TaskStore for SqliteTaskStore {
    fn create(&self, request: CreateTaskRequest) -> Result<CreatedTask, TaskError> {
        let dedup_key = request.dedup_key();
        let conn = self.conn()?;

        if let Some(task) = Self::fetch_by_dedup_key(&conn, &dedup_key)? {
            return Ok(CreatedTask {
                task,
                existed: true,
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = self.clock.now();
        let status = request.status.unwrap_or(TaskStatus::Queued);

        if !matches!(status, TaskStatus::Queued | TaskStatus::Added) {
            return Err(TaskError::InvalidTransition {
                task_id: id,
                from: TaskStatus::Queued,
                to: status,
            });
        }

        let task = Task {
            id,
            dedup_key,
            scope: request.scope,
            artist: request.artist,
            album: request.album,
            year: request.year,
            query: request.query,
            ext_artist_id: request.ext_artist_id,
            ext_album_id: request.ext_album_id,
            source: request.source,
            collision_policy: request.collision_policy,
            min_seeders: request.min_seeders,
            max_releases_per_indexer: request.max_releases_per_indexer,
            preferred_indexer_id: request.preferred_indexer_id,
            target_path: request.target_path,
            status,
            transfer_hash: request.transfer_hash,
            layout: None,
            final_path: None,
            last_error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            last_tried_at: None,
            scheduled_at: request.scheduled_at,
        };

        Self::check_required_fields(&task)?;
        Self::check_hash_owner(&conn, &task)?;

        let inserted = conn
            .execute(
                &format!(
                    "INSERT INTO tasks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, \
                     ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(dedup_key) DO NOTHING",
                    TASK_COLUMNS
                ),
                params![
                    task.id,
                    task.dedup_key,
                    task.scope.as_str(),
                    task.artist,
                    task.album,
                    task.year,
                    task.query,
                    task.ext_artist_id,
                    task.ext_album_id,
                    task.source.as_str(),
                    task.collision_policy.as_str(),
                    task.min_seeders,
                    task.max_releases_per_indexer,
                    task.preferred_indexer_id,
                    task.target_path,
                    task.status.as_str(),
                    task.transfer_hash,
                    Option::<String>::None,
                    Option::<String>::None,
                    Option::<String>::None,
                    format_timestamp(task.created_at),
                    format_timestamp(task.updated_at),
                    Option::<String>::None,
                    Option::<String>::None,
                    Option::<String>::None,
                    task.scheduled_at.map(format_timestamp),
                ],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if inserted == 0 {
            // Another writer on the same database won the race for this key.
            let task = Self::fetch_by_dedup_key(&conn, &task.dedup_key)?
                .ok_or_else(|| TaskError::NotFound(task.dedup_key.clone()))?;
            return Ok(CreatedTask {
                task,
                existed: true,
            });
        }

        debug!(task_id = %task.id, dedup_key = %task.dedup_key, "Created task");

        Ok(CreatedTask {
            task,
            existed: false,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        let conn = self.conn()?;
        Self::fetch_task(&conn, id)
    }

    fn find_by_dedup_key(&self, key: &str) -> Result<Option<Task>, TaskError> {
        let conn = self.conn()?;
        Self::fetch_by_dedup_key(&conn, key)
    }

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError> {
        let conn = self.conn()?;

        let mut conditions = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            conditions.push(format!("status IN ({})", placeholders));
            for status in &filter.statuses {
                values.push(Box::new(status.as_str()));
            }
        }

        match filter.has_hash {
            Some(true) => conditions.push("transfer_hash IS NOT NULL".to_string()),
            Some(false) => conditions.push("transfer_hash IS NULL".to_string()),
            None => {}
        }

        match filter.has_layout {
            Some(true) => conditions.push("layout IS NOT NULL".to_string()),
            Some(false) => conditions.push("layout IS NULL".to_string()),
            None => {}
        }

        if let Some(before) = filter.updated_before {
            conditions.push("updated_at < ?".to_string());
            values.push(Box::new(format_timestamp(before)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM tasks {} ORDER BY updated_at ASC, created_at ASC LIMIT ?",
            TASK_COLUMNS, where_clause
        );
        values.push(Box::new(filter.limit));

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TaskError::Database(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_task)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn count_by_status(&self) -> Result<Vec<(TaskStatus, i64)>, TaskError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status")
            .map_err(|e| TaskError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| TaskError::Database(e.to_string()))?;

        let mut counts = Vec::new();
        for row in rows {
            let (status, count) = row.map_err(|e| TaskError::Database(e.to_string()))?;
            if let Ok(status) = status.parse::<TaskStatus>() {
                counts.push((status, count));
            }
        }
        Ok(counts)
    }

    fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        patch: TaskPatch,
    ) -> Result<Task, TaskError> {
        self.apply_update(id, Some(status), patch)
    }

    fn patch(&self, id: &str, patch: TaskPatch) -> Result<Task, TaskError> {
        self.apply_update(id, None, patch)
    }
}

impl ReleaseStore for SqliteTaskStore {
    fn upsert(&self, task_id: &str, release: NewRelease) -> Result<Release, TaskError> {
        let conn = self.conn()?;

        let id = match Self::find_release_match(&conn, task_id, &release)? {
            Some(existing_id) => {
                conn.execute(
                    "UPDATE releases SET indexer_id = ?, guid = COALESCE(?, guid), \
                     link = COALESCE(?, link), magnet = COALESCE(?, magnet), \
                     info_hash = COALESCE(?, info_hash), size_bytes = COALESCE(?, size_bytes), \
                     seeders = COALESCE(?, seeders), leechers = COALESCE(?, leechers), \
                     published_at = COALESCE(?, published_at), quality = COALESCE(?, quality), \
                     category = COALESCE(?, category), \
                     external_score = COALESCE(?, external_score) WHERE id = ?",
                    params![
                        release.indexer_id,
                        release.guid,
                        release.link,
                        release.magnet,
                        release.info_hash,
                        release.size_bytes,
                        release.seeders,
                        release.leechers,
                        release.published_at.map(format_timestamp),
                        release.quality,
                        release.category,
                        release.external_score,
                        existing_id,
                    ],
                )
                .map_err(|e| TaskError::Database(e.to_string()))?;
                existing_id
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO releases (id, task_id, indexer_id, title, guid, link, magnet, \
                     info_hash, size_bytes, seeders, leechers, published_at, quality, category, \
                     external_score, status, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id,
                        task_id,
                        release.indexer_id,
                        release.title,
                        release.guid,
                        release.link,
                        release.magnet,
                        release.info_hash,
                        release.size_bytes,
                        release.seeders,
                        release.leechers,
                        release.published_at.map(format_timestamp),
                        release.quality,
                        release.category,
                        release.external_score,
                        ReleaseStatus::New.as_str(),
                        format_timestamp(self.clock.now()),
                    ],
                )
                .map_err(|e| TaskError::Database(e.to_string()))?;
                id
            }
        };

        Self::fetch_release(&conn, &id)?.ok_or(TaskError::ReleaseNotFound(id))
    }

    fn get_release(&self, id: &str) -> Result<Option<Release>, TaskError> {
        let conn = self.conn()?;
        Self::fetch_release(&conn, id)
    }

    fn list_for_task(&self, task_id: &str) -> Result<Vec<Release>, TaskError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM releases WHERE task_id = ? ORDER BY seq ASC",
                RELEASE_COLUMNS
            ))
            .map_err(|e| TaskError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![task_id], Self::row_to_release)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn set_release_status(&self, id: &str, status: ReleaseStatus) -> Result<(), TaskError> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE releases SET status = ? WHERE id = ?",
                params![status.as_str(), id],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(TaskError::ReleaseNotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_scores(&self, scores: &[(String, f64)]) -> Result<(), TaskError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| TaskError::Database(e.to_string()))?;

        for (id, score) in scores {
            tx.execute(
                "UPDATE releases SET score = ? WHERE id = ?",
                params![score, id],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| TaskError::Database(e.to_string()))
    }

    fn latest_in_statuses(
        &self,
        task_id: &str,
        statuses: &[ReleaseStatus],
    ) -> Result<Option<Release>, TaskError> {
        if statuses.is_empty() {
            return Ok(None);
        }

        let conn = self.conn()?;
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM releases WHERE task_id = ? AND status IN ({}) ORDER BY seq DESC LIMIT 1",
            RELEASE_COLUMNS, placeholders
        );

        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&task_id];
        let names: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();
        for name in &names {
            values.push(name);
        }

        conn.query_row(&sql, values.as_slice(), Self::row_to_release)
            .optional()
            .map_err(|e| TaskError::Database(e.to_string()))
    }
}

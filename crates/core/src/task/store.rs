//! Task and release storage traits and request types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::layout::Layout;
use crate::placer::CollisionPolicy;

use super::dedup::{make_dedup_key, DedupKeyInput};
use super::{Release, ReleaseStatus, Scope, Task, TaskSource, TaskStatus};

/// Errors from task and release storage.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Release not found: {0}")]
    ReleaseNotFound(String),

    #[error("Cannot move task {task_id} from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task {task_id} cannot enter {status} without {field}")]
    MissingField {
        task_id: String,
        status: TaskStatus,
        field: &'static str,
    },

    #[error("Duplicate torrent hash with task {existing_task_id}")]
    DuplicateHash {
        hash: String,
        existing_task_id: String,
    },

    #[error("Database error: {0}")]
    Database(String),
}

/// Request to create a task.
#[derive(Debug, Clone, Default)]
pub struct CreateTaskRequest {
    pub scope: Scope,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub query: Option<String>,
    pub ext_artist_id: Option<String>,
    pub ext_album_id: Option<String>,
    pub source: TaskSource,
    pub collision_policy: CollisionPolicy,
    pub min_seeders: Option<u32>,
    pub max_releases_per_indexer: Option<u32>,
    pub preferred_indexer_id: Option<i64>,
    pub target_path: Option<String>,
    /// Initial status; only `queued` and `added` (with a hash) are accepted.
    pub status: Option<TaskStatus>,
    pub transfer_hash: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl CreateTaskRequest {
    /// Request for an album want.
    pub fn album(artist: impl Into<String>, album: impl Into<String>, year: Option<i32>) -> Self {
        Self {
            scope: Scope::Album,
            artist: Some(artist.into()),
            album: Some(album.into()),
            year,
            ..Default::default()
        }
    }

    /// Request for an artist want.
    pub fn artist(artist: impl Into<String>) -> Self {
        Self {
            scope: Scope::Artist,
            artist: Some(artist.into()),
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_external_ids(
        mut self,
        artist_id: Option<String>,
        album_id: Option<String>,
    ) -> Self {
        self.ext_artist_id = artist_id;
        self.ext_album_id = album_id;
        self
    }

    pub fn with_source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn with_min_seeders(mut self, min_seeders: u32) -> Self {
        self.min_seeders = Some(min_seeders);
        self
    }

    pub fn with_target_path(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    /// Register a transfer that is already in the download client.
    pub fn with_transfer(mut self, hash: impl Into<String>) -> Self {
        self.status = Some(TaskStatus::Added);
        self.transfer_hash = Some(hash.into());
        self
    }

    /// The identity of this want.
    pub fn dedup_key(&self) -> String {
        make_dedup_key(&DedupKeyInput {
            scope: self.scope,
            query: self.query.as_deref(),
            artist: self.artist.as_deref(),
            album: self.album.as_deref(),
            year: self.year,
            ext_artist_id: self.ext_artist_id.as_deref(),
            ext_album_id: self.ext_album_id.as_deref(),
        })
    }
}

/// Result of an idempotent create.
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub task: Task,
    /// True when the dedup key already existed and no row was inserted.
    pub existed: bool,
}

/// Partial update of a task's runtime fields.
///
/// `None` leaves a field untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub transfer_hash: Option<Option<String>>,
    pub layout: Option<Option<Layout>>,
    pub final_path: Option<Option<String>>,
    pub last_error: Option<Option<String>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub finished_at: Option<Option<DateTime<Utc>>>,
    pub last_tried_at: Option<Option<DateTime<Utc>>>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfer_hash(mut self, hash: impl Into<String>) -> Self {
        self.transfer_hash = Some(Some(hash.into()));
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = Some(Some(layout));
        self
    }

    pub fn final_path(mut self, path: impl Into<String>) -> Self {
        self.final_path = Some(Some(path.into()));
        self
    }

    pub fn last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }

    pub fn clear_last_error(mut self) -> Self {
        self.last_error = Some(None);
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(Some(at));
        self
    }

    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.finished_at = Some(Some(at));
        self
    }

    pub fn last_tried_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_tried_at = Some(Some(at));
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(Some(at));
        self
    }

    pub fn clear_scheduled_at(mut self) -> Self {
        self.scheduled_at = Some(None);
        self
    }

    /// Apply the patch to an in-memory task.
    pub fn apply(&self, task: &mut Task) {
        fn merge<T: Clone>(field: &mut Option<T>, update: &Option<Option<T>>) {
            if let Some(value) = update {
                *field = value.clone();
            }
        }

        merge(&mut task.transfer_hash, &self.transfer_hash);
        merge(&mut task.layout, &self.layout);
        merge(&mut task.final_path, &self.final_path);
        merge(&mut task.last_error, &self.last_error);
        merge(&mut task.started_at, &self.started_at);
        merge(&mut task.finished_at, &self.finished_at);
        merge(&mut task.last_tried_at, &self.last_tried_at);
        merge(&mut task.scheduled_at, &self.scheduled_at);
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    /// Empty means any status.
    pub statuses: Vec<TaskStatus>,
    pub has_hash: Option<bool>,
    pub has_layout: Option<bool>,
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilter {
    pub fn new() -> Self {
        Self {
            statuses: Vec::new(),
            has_hash: None,
            has_layout: None,
            updated_before: None,
            limit: 100,
        }
    }

    pub fn with_statuses(mut self, statuses: &[TaskStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_hash(mut self, has_hash: bool) -> Self {
        self.has_hash = Some(has_hash);
        self
    }

    pub fn with_layout(mut self, has_layout: bool) -> Self {
        self.has_layout = Some(has_layout);
        self
    }

    pub fn updated_before(mut self, at: DateTime<Utc>) -> Self {
        self.updated_before = Some(at);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }
}

/// Fields parsed from one indexer hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRelease {
    pub indexer_id: i64,
    pub title: String,
    pub guid: Option<String>,
    pub link: Option<String>,
    pub magnet: Option<String>,
    pub info_hash: Option<String>,
    pub size_bytes: Option<u64>,
    pub seeders: Option<i64>,
    pub leechers: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub quality: Option<String>,
    pub category: Option<String>,
    pub external_score: Option<f64>,
}

/// Storage for tasks.
pub trait TaskStore: Send + Sync {
    /// Create a task, or return the existing one with the same dedup key.
    fn create(&self, request: CreateTaskRequest) -> Result<CreatedTask, TaskError>;

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError>;

    fn find_by_dedup_key(&self, key: &str) -> Result<Option<Task>, TaskError>;

    fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, TaskError>;

    /// Number of tasks per status; statuses without tasks are omitted.
    fn count_by_status(&self) -> Result<Vec<(TaskStatus, i64)>, TaskError>;

    /// Change status and merge `patch` in one write.
    fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        patch: TaskPatch,
    ) -> Result<Task, TaskError>;

    /// Merge `patch` without changing status.
    fn patch(&self, id: &str, patch: TaskPatch) -> Result<Task, TaskError>;
}

/// Storage for candidate releases.
pub trait ReleaseStore: Send + Sync {
    /// Insert or refresh a release for a task. Matching is by guid, then
    /// info hash, then title; the first present field that matches wins.
    fn upsert(&self, task_id: &str, release: NewRelease) -> Result<Release, TaskError>;

    fn get_release(&self, id: &str) -> Result<Option<Release>, TaskError>;

    /// All releases of a task in discovery order.
    fn list_for_task(&self, task_id: &str) -> Result<Vec<Release>, TaskError>;

    fn set_release_status(&self, id: &str, status: ReleaseStatus) -> Result<(), TaskError>;

    fn set_scores(&self, scores: &[(String, f64)]) -> Result<(), TaskError>;

    /// Most recently discovered release of a task in one of `statuses`.
    fn latest_in_statuses(
        &self,
        task_id: &str,
        statuses: &[ReleaseStatus],
    ) -> Result<Option<Release>, TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_apply_sets_and_clears() {
        let now = Utc::now();
        let mut task = crate::testing::fixtures::task("t1", TaskStatus::Failed);
        task.last_error = Some("boom".to_string());
        task.scheduled_at = Some(now);

        TaskPatch::new()
            .clear_last_error()
            .clear_scheduled_at()
            .transfer_hash("ABC")
            .apply(&mut task);

        assert_eq!(task.last_error, None);
        assert_eq!(task.scheduled_at, None);
        assert_eq!(task.transfer_hash.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_patch_leaves_untouched_fields() {
        let now = Utc::now();
        let mut task = crate::testing::fixtures::task("t1", TaskStatus::Queued);
        task.last_tried_at = Some(now);
        TaskPatch::new().last_error("x").apply(&mut task);
        assert_eq!(task.last_tried_at, Some(now));
    }

    #[test]
    fn test_request_dedup_key_matches_builder() {
        let request = CreateTaskRequest::album("Кино", "Группа крови", Some(1988));
        assert_eq!(request.dedup_key(), "album|кино|группа крови|1988");
    }
}

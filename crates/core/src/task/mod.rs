//! Acquisition tasks, their candidate releases, and the status machine.
//!
//! A [`Task`] is one attempt to acquire an artist or album. It is identified by a
//! normalized dedup key so that repeated wants never produce a second task.
//! Each task collects [`Release`] candidates from indexers; one of them is
//! chosen and handed to the download client.

mod backoff;
mod dedup;
mod sqlite_store;
mod store;
mod types;

pub use backoff::BackoffPolicy;
pub use dedup::{make_dedup_key, normalize_part, DedupKeyInput};
pub use sqlite_store::SqliteTaskStore;
pub use store::{
    CreateTaskRequest, CreatedTask, NewRelease, ReleaseStore, TaskError, TaskFilter, TaskPatch,
    TaskStore,
};
pub use types::{
    AlbumProgress, Release, ReleaseStatus, Scope, Task, TaskSource, TaskStatus, UnknownVariant,
};

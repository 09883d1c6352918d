//! Handing a chosen release to the download client.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::DownloadClientConfig;
use crate::metrics;
use crate::task::{BackoffPolicy, Release, Task, TaskError, TaskPatch, TaskStatus, TaskStore};

use super::link::rewrite_link;
use super::resolver::{HashMethod, HashResolver, MatchHints};
use super::{AddTransferRequest, DownloadClient, DownloadClientError, TransferSource};

pub const NO_HASH_ERROR: &str = "Download client: transfer not found after add (no hash)";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Release {0} has neither magnet nor link")]
    NoLink(String),

    #[error("Download client add failed: {0}")]
    Client(#[from] DownloadClientError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Where and how transfers are added.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub save_path: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub link_override: Option<String>,
    /// Start immediately instead of adding paused.
    pub auto_start: bool,
}

impl SubmitOptions {
    pub fn from_config(config: &DownloadClientConfig, save_path: Option<String>) -> Self {
        Self {
            save_path,
            category: config.category.clone().filter(|c| !c.trim().is_empty()),
            tags: config.tags.clone().filter(|t| !t.trim().is_empty()),
            link_override: config.link_override.clone(),
            auto_start: false,
        }
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

/// Result of a submission that reached the download client.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Added {
        task: Task,
        hash: String,
        method: HashMethod,
    },
    /// Added, but the transfer could not be identified; the task failed.
    NoHash { task: Task },
    /// Another task already owns the transfer; this task failed.
    DuplicateHash {
        task: Task,
        existing_task_id: String,
    },
}

impl SubmitOutcome {
    pub fn task(&self) -> &Task {
        match self {
            SubmitOutcome::Added { task, .. }
            | SubmitOutcome::NoHash { task }
            | SubmitOutcome::DuplicateHash { task, .. } => task,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, SubmitOutcome::Added { .. })
    }
}

pub struct TransferSubmitter {
    tasks: Arc<dyn TaskStore>,
    client: Arc<dyn DownloadClient>,
    resolver: HashResolver,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    options: SubmitOptions,
}

impl TransferSubmitter {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        client: Arc<dyn DownloadClient>,
        resolver: HashResolver,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
        options: SubmitOptions,
    ) -> Self {
        Self {
            tasks,
            client,
            resolver,
            clock,
            backoff,
            options,
        }
    }

    pub fn options(&self) -> &SubmitOptions {
        &self.options
    }

    /// Add `release` to the download client and bind its hash to `task_id`.
    ///
    /// `auto_start` overrides the configured start behaviour for this call.
    /// A failed add fails the task with backoff and returns the error.
    pub async fn submit(
        &self,
        task_id: &str,
        release: &Release,
        auto_start: Option<bool>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| SubmitError::TaskNotFound(task_id.to_string()))?;

        let source = match (&release.magnet, &release.link) {
            (Some(magnet), _) => TransferSource::Magnet(magnet.clone()),
            (None, Some(link)) => {
                TransferSource::Url(rewrite_link(link, self.options.link_override.as_deref()))
            }
            (None, None) => return Err(SubmitError::NoLink(release.id.clone())),
        };

        let precomputed = self.resolver.precompute(release).await;

        let prev_scheduled_at = task.scheduled_at;
        let prev_last_tried_at = task.last_tried_at;
        let submitted_at = self.clock.now();

        let request = AddTransferRequest::new(source)
            .with_save_path(self.options.save_path.clone())
            .with_category(self.options.category.clone())
            .with_tags(self.options.tags.clone())
            .with_paused(!auto_start.unwrap_or(self.options.auto_start));

        if let Err(e) = self.client.add(request).await {
            let next_at = self
                .backoff
                .next_retry_at(submitted_at, prev_scheduled_at, prev_last_tried_at);
            self.tasks.update_status(
                task_id,
                TaskStatus::Failed,
                TaskPatch::new()
                    .last_error(format!("Download client add failed: {}", e))
                    .scheduled_at(next_at)
                    .last_tried_at(submitted_at),
            )?;
            metrics::record_transition(TaskStatus::Failed);
            warn!(task_id = %task_id, release_id = %release.id, error = %e, "Adding transfer failed");
            return Err(e.into());
        }

        let resolved = match precomputed {
            Some(found) => Some(found),
            None => {
                let hints = MatchHints::new(&task, release);
                self.resolver
                    .poll(
                        self.client.as_ref(),
                        self.options.category.as_deref(),
                        &hints,
                        submitted_at,
                    )
                    .await
                    .map(|hash| (hash, HashMethod::Poll))
            }
        };

        let Some((hash, method)) = resolved else {
            let now = self.clock.now();
            let next_at = self
                .backoff
                .next_retry_at(now, prev_scheduled_at, prev_last_tried_at);
            let task = self.tasks.update_status(
                task_id,
                TaskStatus::Failed,
                TaskPatch::new()
                    .last_error(NO_HASH_ERROR)
                    .scheduled_at(next_at)
                    .last_tried_at(now),
            )?;
            metrics::record_transition(TaskStatus::Failed);
            metrics::HASH_RESOLUTIONS.with_label_values(&["none"]).inc();
            warn!(task_id = %task_id, release_id = %release.id, "Transfer added but hash not resolved");
            return Ok(SubmitOutcome::NoHash { task });
        };

        let now = self.clock.now();
        let mut patch = TaskPatch::new()
            .transfer_hash(hash.clone())
            .last_tried_at(now)
            .clear_last_error()
            .clear_scheduled_at();
        if task.started_at.is_none() {
            patch = patch.started_at(now);
        }

        match self.tasks.update_status(task_id, TaskStatus::Added, patch) {
            Ok(task) => {
                metrics::record_transition(TaskStatus::Added);
                metrics::TRANSFERS_ADDED.inc();
                metrics::HASH_RESOLUTIONS
                    .with_label_values(&[method.as_str()])
                    .inc();
                info!(
                    task_id = %task_id,
                    release_id = %release.id,
                    hash = %hash,
                    method = method.as_str(),
                    "Transfer added"
                );
                Ok(SubmitOutcome::Added { task, hash, method })
            }
            Err(TaskError::DuplicateHash {
                existing_task_id, ..
            }) => {
                let task = self.tasks.update_status(
                    task_id,
                    TaskStatus::Failed,
                    TaskPatch::new()
                        .last_error(format!(
                            "Duplicate torrent hash with task {}",
                            existing_task_id
                        ))
                        .last_tried_at(now)
                        .clear_scheduled_at(),
                )?;
                metrics::record_transition(TaskStatus::Failed);
                warn!(
                    task_id = %task_id,
                    existing_task_id = %existing_task_id,
                    hash = %hash,
                    "Duplicate transfer hash"
                );
                Ok(SubmitOutcome::DuplicateHash {
                    task,
                    existing_task_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::download_client::{ResolverConfig, TransferInfo, TransferState};
    use crate::task::{CreateTaskRequest, NewRelease, ReleaseStore, SqliteTaskStore};
    use crate::testing::{MockDownloadClient, MockTorrentFetcher};
    use chrono::{DateTime, TimeZone, Utc};

    const HASH: &str = "C12FE1C06BBA254A9DC9F519B335AA7C1367A88A";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    struct Harness {
        store: Arc<SqliteTaskStore>,
        client: Arc<MockDownloadClient>,
        fetcher: Arc<MockTorrentFetcher>,
        submitter: TransferSubmitter,
    }

    fn harness(options: SubmitOptions) -> Harness {
        let clock = Arc::new(ManualClock::new(now()));
        let store = Arc::new(SqliteTaskStore::in_memory().unwrap().with_clock(clock.clone()));
        let client = Arc::new(MockDownloadClient::new());
        let fetcher = Arc::new(MockTorrentFetcher::new());
        let resolver = HashResolver::new(
            fetcher.clone(),
            ResolverConfig {
                attempts: 2,
                delay_ms: 0,
                ..Default::default()
            },
        );
        let submitter = TransferSubmitter::new(
            store.clone(),
            client.clone(),
            resolver,
            clock,
            BackoffPolicy::default(),
            options,
        );
        Harness {
            store,
            client,
            fetcher,
            submitter,
        }
    }

    fn found_task(store: &SqliteTaskStore, album: &str) -> String {
        let id = store
            .create(CreateTaskRequest::album("Pink Floyd", album, Some(1979)))
            .unwrap()
            .task
            .id;
        store
            .update_status(&id, TaskStatus::Searching, TaskPatch::new())
            .unwrap();
        store
            .update_status(&id, TaskStatus::Found, TaskPatch::new())
            .unwrap();
        id
    }

    fn release(store: &SqliteTaskStore, task_id: &str, magnet: Option<&str>, link: Option<&str>) -> Release {
        store
            .upsert(
                task_id,
                NewRelease {
                    indexer_id: 1,
                    title: "Pink Floyd - The Wall (1979) [FLAC]".to_string(),
                    magnet: magnet.map(str::to_string),
                    link: link.map(str::to_string),
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_magnet_binds_hash() {
        let h = harness(SubmitOptions {
            save_path: Some("/downloads".to_string()),
            category: Some("music".to_string()),
            ..Default::default()
        });
        let task_id = found_task(&h.store, "The Wall");
        let magnet = format!("magnet:?xt=urn:btih:{}", HASH.to_lowercase());
        let release = release(&h.store, &task_id, Some(&magnet), None);

        let outcome = h.submitter.submit(&task_id, &release, None).await.unwrap();

        match &outcome {
            SubmitOutcome::Added { task, hash, method } => {
                assert_eq!(hash, HASH);
                assert_eq!(*method, HashMethod::Magnet);
                assert_eq!(task.status, TaskStatus::Added);
                assert_eq!(task.transfer_hash.as_deref(), Some(HASH));
                assert_eq!(task.started_at, Some(now()));
                assert_eq!(task.last_tried_at, Some(now()));
                assert_eq!(task.scheduled_at, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let added = h.client.added_requests().await;
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].source, TransferSource::Magnet(magnet));
        assert_eq!(added[0].save_path.as_deref(), Some("/downloads"));
        assert_eq!(added[0].category.as_deref(), Some("music"));
        assert!(added[0].paused);
    }

    #[tokio::test]
    async fn test_submit_link_is_rewritten_and_hashed() {
        let h = harness(SubmitOptions {
            link_override: Some("http://jackett:9117".to_string()),
            auto_start: true,
            ..Default::default()
        });
        let task_id = found_task(&h.store, "The Wall");
        let link = "http://localhost:9117/dl/1?file=x";
        h.fetcher
            .set_response(link, b"d4:infod4:name1:aee".to_vec())
            .await;
        let release = release(&h.store, &task_id, None, Some(link));

        let outcome = h.submitter.submit(&task_id, &release, None).await.unwrap();
        assert!(outcome.is_added());
        assert_eq!(
            outcome.task().transfer_hash.as_deref(),
            Some("9E3F71178C577DCB032D2D7DFBB436D21769D456")
        );

        let added = h.client.added_requests().await;
        assert_eq!(
            added[0].source,
            TransferSource::Url("http://jackett:9117/dl/1?file=x".to_string())
        );
        assert!(!added[0].paused);
    }

    #[tokio::test]
    async fn test_submit_resolves_by_polling() {
        let h = harness(SubmitOptions::default());
        let task_id = found_task(&h.store, "The Wall");
        let release = release(&h.store, &task_id, None, Some("http://jackett/dl/unfetchable"));

        h.client
            .set_appear_on_add(Some(TransferInfo {
                hash: "abcdef".to_string(),
                name: "Pink Floyd - The Wall".to_string(),
                state: TransferState::Paused,
                progress: 0.0,
                size_bytes: 1,
                save_path: None,
                content_path: None,
                added_at: Some(now()),
                category: None,
            }))
            .await;

        let outcome = h.submitter.submit(&task_id, &release, None).await.unwrap();
        match outcome {
            SubmitOutcome::Added { hash, method, .. } => {
                assert_eq!(hash, "ABCDEF");
                assert_eq!(method, HashMethod::Poll);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_without_hash_fails_task() {
        let h = harness(SubmitOptions::default());
        let task_id = found_task(&h.store, "The Wall");
        let release = release(&h.store, &task_id, None, Some("http://jackett/dl/unfetchable"));

        let outcome = h.submitter.submit(&task_id, &release, None).await.unwrap();
        let task = match outcome {
            SubmitOutcome::NoHash { task } => task,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.last_error.as_deref(), Some(NO_HASH_ERROR));
        assert_eq!(task.scheduled_at, Some(now() + chrono::Duration::minutes(5)));
    }

    #[tokio::test]
    async fn test_add_failure_fails_task_and_propagates() {
        let h = harness(SubmitOptions::default());
        let task_id = found_task(&h.store, "The Wall");
        let release = release(&h.store, &task_id, Some("magnet:?xt=urn:btih:x"), None);
        h.client.set_add_error(Some("Connection refused")).await;

        let err = h.submitter.submit(&task_id, &release, None).await.unwrap_err();
        assert!(matches!(err, SubmitError::Client(_)));

        let task = h.store.get(&task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task
            .last_error
            .unwrap()
            .starts_with("Download client add failed:"));
        assert!(task.scheduled_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_hash_fails_without_schedule() {
        let h = harness(SubmitOptions::default());
        let magnet = format!("magnet:?xt=urn:btih:{}", HASH);

        let first = found_task(&h.store, "The Wall");
        let r1 = release(&h.store, &first, Some(&magnet), None);
        h.submitter.submit(&first, &r1, None).await.unwrap();

        let second = found_task(&h.store, "The Wall Live");
        let r2 = release(&h.store, &second, Some(&magnet), None);
        let outcome = h.submitter.submit(&second, &r2, None).await.unwrap();

        match outcome {
            SubmitOutcome::DuplicateHash {
                task,
                existing_task_id,
            } => {
                assert_eq!(existing_task_id, first);
                assert_eq!(task.status, TaskStatus::Failed);
                assert_eq!(
                    task.last_error,
                    Some(format!("Duplicate torrent hash with task {}", first))
                );
                assert_eq!(task.scheduled_at, None);
                assert_eq!(task.transfer_hash, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_without_links() {
        let h = harness(SubmitOptions::default());
        let task_id = found_task(&h.store, "The Wall");
        let release = release(&h.store, &task_id, None, None);

        let err = h.submitter.submit(&task_id, &release, None).await.unwrap_err();
        assert!(matches!(err, SubmitError::NoLink(_)));
        assert!(h.client.added_requests().await.is_empty());
    }
}

//! Task search across all available indexers.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::indexer::HealthTracker;
use crate::metrics;
use crate::task::{BackoffPolicy, ReleaseStore, TaskPatch, TaskStatus, TaskStore};

use super::{
    FeedRequest, IndexerFeed, IndexerSearchResult, SearchError, SearchOutcome, SearchReport,
};

/// Minutes before an empty search is retried.
pub const EMPTY_RETRY_MINUTES: i64 = 30;

/// Searches indexers for a task, stores the hits and moves the task on.
pub struct SearchService {
    tasks: Arc<dyn TaskStore>,
    releases: Arc<dyn ReleaseStore>,
    health: Arc<HealthTracker>,
    feed: Arc<dyn IndexerFeed>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
}

impl SearchService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        releases: Arc<dyn ReleaseStore>,
        health: Arc<HealthTracker>,
        feed: Arc<dyn IndexerFeed>,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            tasks,
            releases,
            health,
            feed,
            clock,
            backoff,
        }
    }

    /// Search every available indexer (snapshot taken once) for `task_id`.
    ///
    /// `limit_per_indexer` is overridden by the task's own
    /// `max_releases_per_indexer`. A task with a preferred indexer only searches
    /// that indexer when it is available.
    pub async fn search_task(
        &self,
        task_id: &str,
        limit_per_indexer: Option<u32>,
    ) -> Result<SearchReport, SearchError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| SearchError::TaskNotFound(task_id.to_string()))?;

        let query = task.query.as_deref().map(str::trim).unwrap_or_default();
        if query.is_empty() {
            return Err(SearchError::MissingQuery(task_id.to_string()));
        }
        let query = query.to_string();

        // Backoff is derived from the schedule as it was before this attempt.
        let prev_scheduled_at = task.scheduled_at;
        let prev_last_tried_at = task.last_tried_at;
        let now = self.clock.now();

        self.tasks.update_status(
            task_id,
            TaskStatus::Searching,
            TaskPatch::new().last_tried_at(now),
        )?;
        metrics::record_transition(TaskStatus::Searching);

        let mut indexers = self.health.list_available()?;
        if let Some(preferred) = task.preferred_indexer_id {
            if indexers.iter().any(|i| i.id == preferred) {
                indexers.retain(|i| i.id == preferred);
            }
        }

        if indexers.is_empty() {
            let next_at = self
                .backoff
                .next_retry_at(now, prev_scheduled_at, prev_last_tried_at);
            self.tasks.update_status(
                task_id,
                TaskStatus::Failed,
                TaskPatch::new()
                    .last_error("No enabled indexers")
                    .scheduled_at(next_at),
            )?;
            metrics::record_transition(TaskStatus::Failed);
            metrics::SEARCHES
                .with_label_values(&[SearchOutcome::NoIndexers.as_str()])
                .inc();
            warn!(task_id = %task_id, "No enabled indexers");

            return Ok(SearchReport {
                task_id: task_id.to_string(),
                outcome: SearchOutcome::NoIndexers,
                saved: 0,
                per_indexer: Vec::new(),
            });
        }

        let request = FeedRequest {
            query,
            limit: task.max_releases_per_indexer.or(limit_per_indexer),
        };

        let mut per_indexer = Vec::with_capacity(indexers.len());
        let mut total_saved = 0;

        for indexer in &indexers {
            match self.feed.fetch(indexer, &request).await {
                Ok(items) => {
                    let mut saved = 0;
                    for item in items {
                        self.releases
                            .upsert(task_id, item.into_release(indexer.id))?;
                        saved += 1;
                    }
                    self.health.record_outcome(indexer.id, None)?;

                    info!(
                        task_id = %task_id,
                        indexer = %indexer.name,
                        found = saved,
                        "Indexer search ok"
                    );
                    per_indexer.push(IndexerSearchResult {
                        indexer_id: indexer.id,
                        name: indexer.name.clone(),
                        ok: true,
                        error: None,
                        found: saved,
                    });
                    total_saved += saved;
                }
                Err(e) => {
                    let message = e.to_string();
                    self.health.record_outcome(indexer.id, Some(&message))?;

                    warn!(
                        task_id = %task_id,
                        indexer = %indexer.name,
                        error = %message,
                        "Indexer search failed"
                    );
                    per_indexer.push(IndexerSearchResult {
                        indexer_id: indexer.id,
                        name: indexer.name.clone(),
                        ok: false,
                        error: Some(message),
                        found: 0,
                    });
                }
            }
        }

        let all_failed = per_indexer.iter().all(|r| !r.ok);

        let outcome = if total_saved > 0 {
            self.tasks.update_status(
                task_id,
                TaskStatus::Found,
                TaskPatch::new().clear_last_error().clear_scheduled_at(),
            )?;
            metrics::record_transition(TaskStatus::Found);
            SearchOutcome::Ok
        } else if all_failed {
            let first_error = per_indexer
                .iter()
                .find_map(|r| r.error.clone())
                .unwrap_or_else(|| "indexer error".to_string());
            let next_at = self
                .backoff
                .next_retry_at(now, prev_scheduled_at, prev_last_tried_at);
            self.tasks.update_status(
                task_id,
                TaskStatus::Failed,
                TaskPatch::new()
                    .last_error(format!("Indexer: {}", first_error))
                    .scheduled_at(next_at),
            )?;
            metrics::record_transition(TaskStatus::Failed);
            SearchOutcome::IndexerError
        } else {
            self.tasks.update_status(
                task_id,
                TaskStatus::Queued,
                TaskPatch::new()
                    .last_error("No releases found")
                    .scheduled_at(now + Duration::minutes(EMPTY_RETRY_MINUTES)),
            )?;
            metrics::record_transition(TaskStatus::Queued);
            SearchOutcome::Empty
        };

        metrics::SEARCHES
            .with_label_values(&[outcome.as_str()])
            .inc();
        info!(
            task_id = %task_id,
            outcome = outcome.as_str(),
            saved = total_saved,
            "Task search finished"
        );

        Ok(SearchReport {
            task_id: task_id.to_string(),
            outcome,
            saved: total_saved,
            per_indexer,
        })
    }
}

//! Acquisition pipeline runner.
//!
//! Works through the unresolved wanted records in fixed-size batches. Every
//! record of a batch runs concurrently (create task, search, select, submit);
//! the next batch starts only when the whole batch has finished.

use std::sync::Arc;

use chrono::Duration;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::catalog::{WantedCatalog, WantedRecord};
use crate::clock::Clock;
use crate::download_client::{SubmitOutcome, TransferSubmitter};
use crate::indexer::HealthTracker;
use crate::metrics;
use crate::placer::CollisionPolicy;
use crate::searcher::{SearchOutcome, SearchService, EMPTY_RETRY_MINUTES};
use crate::selector::{ReleaseSelector, Selection};
use crate::task::{
    CreateTaskRequest, Scope, Task, TaskPatch, TaskSource, TaskStatus, TaskStore,
};

use super::types::{CancelFlag, PipelineError, PlanEntry, RunOptions, RunReport, RunStats};

/// Error recorded when a search found releases but none can be chosen.
pub const NO_CANDIDATES_ERROR: &str = "No suitable releases";

/// Search query for a wanted record.
pub fn build_query(record: &WantedRecord) -> String {
    match record.scope {
        Scope::Artist => format!("{} FLAC", record.artist.trim()),
        Scope::Album => {
            let year = record.year.map(|y| y.to_string());
            let parts: Vec<&str> = [
                Some(record.artist.as_str()),
                record.album.as_deref(),
                year.as_deref(),
            ]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
            format!("{} FLAC", parts.join(" - "))
        }
    }
}

/// Tasks that the pipeline leaves alone: already in the client, done, invalid,
/// or waiting for their retry time.
pub fn should_skip(task: &Task, now: chrono::DateTime<chrono::Utc>) -> bool {
    task.status.is_settled() || task.scheduled_at.is_some_and(|at| at > now)
}

pub struct AcquisitionPipeline {
    tasks: Arc<dyn TaskStore>,
    catalog: Arc<dyn WantedCatalog>,
    health: Arc<HealthTracker>,
    search: Arc<SearchService>,
    selector: Arc<ReleaseSelector>,
    submitter: Arc<TransferSubmitter>,
    clock: Arc<dyn Clock>,
    collision_policy: CollisionPolicy,
}

impl AcquisitionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        catalog: Arc<dyn WantedCatalog>,
        health: Arc<HealthTracker>,
        search: Arc<SearchService>,
        selector: Arc<ReleaseSelector>,
        submitter: Arc<TransferSubmitter>,
        clock: Arc<dyn Clock>,
        collision_policy: CollisionPolicy,
    ) -> Self {
        Self {
            tasks,
            catalog,
            health,
            search,
            selector,
            submitter,
            clock,
            collision_policy,
        }
    }

    fn task_request(&self, record: &WantedRecord, options: &RunOptions) -> CreateTaskRequest {
        CreateTaskRequest {
            scope: record.scope,
            artist: Some(record.artist.clone()),
            album: record.album.clone(),
            year: record.year,
            query: Some(build_query(record)),
            ext_artist_id: record.ext_artist_id.clone(),
            ext_album_id: record.ext_album_id.clone(),
            source: TaskSource::Catalog,
            collision_policy: self.collision_policy,
            min_seeders: Some(options.min_seeders),
            ..Default::default()
        }
    }

    /// What a run would do, without writing anything.
    pub fn plan(
        &self,
        records: &[WantedRecord],
        options: &RunOptions,
    ) -> Result<Vec<PlanEntry>, PipelineError> {
        let now = self.clock.now();
        records
            .iter()
            .map(|record| {
                let request = self.task_request(record, options);
                let dedup_key = request.dedup_key();
                let existing = self.tasks.find_by_dedup_key(&dedup_key)?;
                Ok(PlanEntry {
                    record_id: record.id.clone(),
                    scope: record.scope,
                    query: request.query.unwrap_or_default(),
                    dedup_key,
                    would_skip: existing.as_ref().is_some_and(|t| should_skip(t, now)),
                    existing_status: existing.as_ref().map(|t| t.status),
                    existing_task_id: existing.map(|t| t.id),
                })
            })
            .collect()
    }

    /// Run over the unresolved wanted records.
    ///
    /// Cancellation is checked between batches and before each record.
    /// Indexer unavailability halts the run; other per-record errors are
    /// counted and do not affect siblings.
    pub async fn run_unmatched(
        &self,
        options: &RunOptions,
        cancel: &CancelFlag,
    ) -> Result<RunReport, PipelineError> {
        let started_at = self.clock.now();
        let records = self.catalog.list_unresolved(options.limit)?;
        info!(
            records = records.len(),
            dry_run = options.dry_run,
            parallelism = options.parallelism,
            "Pipeline run started"
        );

        if options.dry_run {
            let plan = self.plan(&records, options)?;
            return Ok(RunReport {
                started_at,
                finished_at: self.clock.now(),
                dry_run: true,
                stats: RunStats::default(),
                cancelled: false,
                halted: None,
                plan,
            });
        }

        let mut stats = RunStats::default();
        let mut halted = None;

        for batch in records.chunks(options.parallelism.max(1)) {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.health.ensure_available() {
                error!(error = %e, "Halting pipeline run");
                halted = Some(e.to_string());
                break;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|record| self.process_record(record, options, cancel)),
            )
            .await;

            for (delta, result) in results {
                stats.absorb(&delta);
                match result {
                    Ok(()) => {}
                    Err(e) if e.halts_run() => {
                        error!(error = %e, "Halting pipeline run");
                        stats.errors += 1;
                        halted.get_or_insert(e.to_string());
                    }
                    Err(e) => {
                        warn!(error = %e, "Wanted record failed");
                        stats.errors += 1;
                    }
                }
            }

            if halted.is_some() {
                break;
            }
        }

        let report = RunReport {
            started_at,
            finished_at: self.clock.now(),
            dry_run: false,
            stats,
            cancelled: cancel.is_cancelled(),
            halted,
            plan: Vec::new(),
        };
        info!(
            created = report.stats.tasks_created,
            reused = report.stats.tasks_reused,
            added = report.stats.added,
            skipped = report.stats.skipped_existing,
            errors = report.stats.errors,
            cancelled = report.cancelled,
            halted = report.halted.is_some(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    /// Create or reuse the task of one record and drive it to the client.
    async fn process_record(
        &self,
        record: &WantedRecord,
        options: &RunOptions,
        cancel: &CancelFlag,
    ) -> (RunStats, Result<(), PipelineError>) {
        let mut stats = RunStats::default();
        if cancel.is_cancelled() {
            return (stats, Ok(()));
        }

        let task = match self.tasks.create(self.task_request(record, options)) {
            Ok(created) if created.existed => {
                stats.tasks_reused += 1;
                created.task
            }
            Ok(created) => {
                stats.tasks_created += 1;
                metrics::record_transition(created.task.status);
                created.task
            }
            Err(e) => return (stats, Err(e.into())),
        };

        let result = if should_skip(&task, self.clock.now()) {
            debug!(task_id = %task.id, status = %task.status, "Skipping existing task");
            stats.skipped_existing += 1;
            Ok(())
        } else if cancel.is_cancelled() {
            Ok(())
        } else {
            self.acquire(&task, options, &mut stats).await
        };

        if record.scope == Scope::Album {
            self.write_progress(record, &task.id);
        }
        (stats, result)
    }

    async fn acquire(
        &self,
        task: &Task,
        options: &RunOptions,
        stats: &mut RunStats,
    ) -> Result<(), PipelineError> {
        self.health.ensure_available()?;

        let report = self
            .search
            .search_task(&task.id, Some(options.per_indexer_limit))
            .await?;
        match report.outcome {
            SearchOutcome::Ok => stats.searches_ok += 1,
            SearchOutcome::Empty => {
                stats.searches_empty += 1;
                return Ok(());
            }
            outcome => {
                return Err(PipelineError::IndexersFailed {
                    task_id: task.id.clone(),
                    outcome: outcome.as_str().to_string(),
                })
            }
        }

        let release = match self.selector.pick_best(&task.id, true)? {
            Selection::Chosen { release, score } => {
                debug!(task_id = %task.id, release_id = %release.id, score, "Release chosen");
                release
            }
            Selection::NoCandidates => {
                stats.no_candidates += 1;
                self.tasks.update_status(
                    &task.id,
                    TaskStatus::Queued,
                    TaskPatch::new()
                        .last_error(NO_CANDIDATES_ERROR)
                        .scheduled_at(self.clock.now() + Duration::minutes(EMPTY_RETRY_MINUTES)),
                )?;
                metrics::record_transition(TaskStatus::Queued);
                info!(task_id = %task.id, "No release passed selection");
                return Ok(());
            }
        };

        match self
            .submitter
            .submit(&task.id, &release, Some(options.auto_start))
            .await?
        {
            SubmitOutcome::Added { .. } => stats.added += 1,
            SubmitOutcome::NoHash { .. } | SubmitOutcome::DuplicateHash { .. } => stats.errors += 1,
        }
        Ok(())
    }

    fn write_progress(&self, record: &WantedRecord, task_id: &str) {
        let progress = match self.tasks.get(task_id) {
            Ok(Some(task)) => task.status.album_progress(),
            Ok(None) => return,
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Could not read task for progress");
                return;
            }
        };
        if let Err(e) = self.catalog.set_progress(&record.id, progress) {
            warn!(record_id = %record.id, error = %e, "Could not write album progress");
        }
    }
}

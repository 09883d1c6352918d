//! Types for pipeline runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::PipelineConfig;
use crate::download_client::SubmitError;
use crate::indexer::IndexerError;
use crate::searcher::SearchError;
use crate::task::{Scope, TaskError, TaskStatus};

/// Errors that stop a run or a single record.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// Every queried indexer failed for a task.
    #[error("Indexers failed while searching task {task_id}: {outcome}")]
    IndexersFailed { task_id: String, outcome: String },

    #[error("A pipeline run is already in progress")]
    AlreadyRunning,
}

impl PipelineError {
    /// Indexer-wide conditions that stop the whole run instead of one task.
    pub fn halts_run(&self) -> bool {
        matches!(
            self,
            PipelineError::Indexer(IndexerError::Unavailable { .. })
                | PipelineError::IndexersFailed { .. }
        )
    }
}

/// Knobs for one run over the wanted catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    pub limit: usize,
    pub min_seeders: u32,
    pub per_indexer_limit: u32,
    pub dry_run: bool,
    pub auto_start: bool,
    pub parallelism: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            min_seeders: 1,
            per_indexer_limit: 20,
            dry_run: false,
            auto_start: true,
            parallelism: 10,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            limit: config.limit,
            min_seeders: config.min_seeders,
            per_indexer_limit: config.per_indexer_limit,
            dry_run: false,
            auto_start: config.auto_start,
            parallelism: config.parallelism,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub tasks_created: usize,
    pub tasks_reused: usize,
    pub searches_ok: usize,
    pub searches_empty: usize,
    /// Search found releases but none passed selection.
    pub no_candidates: usize,
    pub added: usize,
    pub skipped_existing: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn absorb(&mut self, other: &RunStats) {
        self.tasks_created += other.tasks_created;
        self.tasks_reused += other.tasks_reused;
        self.searches_ok += other.searches_ok;
        self.searches_empty += other.searches_empty;
        self.no_candidates += other.no_candidates;
        self.added += other.added;
        self.skipped_existing += other.skipped_existing;
        self.errors += other.errors;
    }
}

/// What a dry run would do with one wanted record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    pub record_id: String,
    pub scope: Scope,
    pub query: String,
    pub dedup_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_status: Option<TaskStatus>,
    pub would_skip: bool,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub stats: RunStats,
    pub cancelled: bool,
    /// Why the run stopped early, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<PlanEntry>,
}

/// Run-level cancellation, shared between the runner and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_defaults() {
        let options = RunOptions::default();
        assert_eq!(options.limit, 50);
        assert_eq!(options.min_seeders, 1);
        assert_eq!(options.per_indexer_limit, 20);
        assert!(!options.dry_run);
        assert!(options.auto_start);
        assert_eq!(options.parallelism, 10);

        let partial: RunOptions = serde_json::from_str(r#"{"dry_run": true, "limit": 5}"#).unwrap();
        assert!(partial.dry_run);
        assert_eq!(partial.limit, 5);
        assert_eq!(partial.parallelism, 10);
    }

    #[test]
    fn test_stats_absorb() {
        let mut total = RunStats::default();
        total.absorb(&RunStats {
            tasks_created: 1,
            added: 1,
            ..Default::default()
        });
        total.absorb(&RunStats {
            tasks_reused: 1,
            errors: 2,
            ..Default::default()
        });
        assert_eq!(total.tasks_created, 1);
        assert_eq!(total.tasks_reused, 1);
        assert_eq!(total.added, 1);
        assert_eq!(total.errors, 2);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn test_halting_errors() {
        let unavailable = PipelineError::Indexer(IndexerError::Unavailable {
            enabled: 1,
            cooldown: 1,
            disabled: 0,
            next_at: None,
        });
        assert!(unavailable.halts_run());
        assert!(!PipelineError::Task(TaskError::NotFound("x".into())).halts_run());
    }
}

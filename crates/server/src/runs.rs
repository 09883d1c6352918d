//! Background pipeline runs triggered over the API.
//!
//! At most one run is in flight. The last report (or error) is kept for the
//! status endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use harvest_core::{AcquisitionPipeline, CancelFlag, PipelineError, RunOptions, RunReport};

/// Per-run overrides of the configured [`RunOptions`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    pub limit: Option<usize>,
    pub min_seeders: Option<u32>,
    pub per_indexer_limit: Option<u32>,
    pub dry_run: Option<bool>,
    pub auto_start: Option<bool>,
    pub parallelism: Option<usize>,
}

impl RunRequest {
    pub fn apply(&self, defaults: &RunOptions) -> RunOptions {
        RunOptions {
            limit: self.limit.unwrap_or(defaults.limit),
            min_seeders: self.min_seeders.unwrap_or(defaults.min_seeders),
            per_indexer_limit: self.per_indexer_limit.unwrap_or(defaults.per_indexer_limit),
            dry_run: self.dry_run.unwrap_or(defaults.dry_run),
            auto_start: self.auto_start.unwrap_or(defaults.auto_start),
            parallelism: self.parallelism.unwrap_or(defaults.parallelism).max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct PipelineRuns {
    pipeline: Arc<AcquisitionPipeline>,
    defaults: RunOptions,
    running: AtomicBool,
    cancel: CancelFlag,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_report: RwLock<Option<RunReport>>,
    last_error: RwLock<Option<String>>,
}

impl PipelineRuns {
    pub fn new(pipeline: Arc<AcquisitionPipeline>, defaults: RunOptions) -> Self {
        Self {
            pipeline,
            defaults,
            running: AtomicBool::new(false),
            cancel: CancelFlag::new(),
            started_at: RwLock::new(None),
            last_report: RwLock::new(None),
            last_error: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a run in the background and return the options it uses.
    pub async fn start(self: &Arc<Self>, request: RunRequest) -> Result<RunOptions, PipelineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyRunning);
        }

        let options = request.apply(&self.defaults);
        self.cancel.reset();
        *self.started_at.write().await = Some(Utc::now());

        let runs = Arc::clone(self);
        let run_options = options.clone();
        tokio::spawn(async move {
            info!(?run_options, "Starting pipeline run");
            let result = runs.pipeline.run_unmatched(&run_options, &runs.cancel).await;
            match result {
                Ok(report) => {
                    info!(
                        added = report.stats.added,
                        errors = report.stats.errors,
                        cancelled = report.cancelled,
                        "Background pipeline run completed"
                    );
                    *runs.last_report.write().await = Some(report);
                    *runs.last_error.write().await = None;
                }
                Err(e) => {
                    error!(error = %e, "Pipeline run failed");
                    *runs.last_error.write().await = Some(e.to_string());
                }
            }
            runs.running.store(false, Ordering::SeqCst);
        });

        Ok(options)
    }

    /// Ask the current run to stop. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        warn!("Cancelling pipeline run");
        self.cancel.cancel();
        true
    }

    pub async fn status(&self) -> RunStatus {
        let running = self.is_running();
        RunStatus {
            running,
            started_at: *self.started_at.read().await,
            last_report: self.last_report.read().await.clone(),
            last_error: self.last_error.read().await.clone(),
        }
    }
}

//! Reconciling download client state into tasks.
//!
//! Each tick refreshes stale active tasks from the client, classifies the
//! layout of freshly added transfers (rejecting unusable ones) and imports
//! finished downloads into the library.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::PollerConfig;
use crate::download_client::{DownloadClient, DownloadClientError};
use crate::importer::LibraryImporter;
use crate::layout::classify;
use crate::metrics;
use crate::task::{
    BackoffPolicy, ReleaseStatus, ReleaseStore, Task, TaskError, TaskFilter, TaskPatch, TaskStatus,
    TaskStore,
};

pub const MISSING_TRANSFER_ERROR: &str = "Torrent not found in download client";

#[derive(Debug, Error)]
pub enum PollerError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Download client: {0}")]
    Client(#[from] DownloadClientError),
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub refreshed: usize,
    pub classified: usize,
    pub rejected: usize,
    pub imported: usize,
    pub relocated: usize,
    pub errors: usize,
}

pub struct Poller {
    tasks: Arc<dyn TaskStore>,
    releases: Arc<dyn ReleaseStore>,
    client: Arc<dyn DownloadClient>,
    importer: Arc<LibraryImporter>,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    config: PollerConfig,
    delete_files: bool,

    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Poller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        releases: Arc<dyn ReleaseStore>,
        client: Arc<dyn DownloadClient>,
        importer: Arc<LibraryImporter>,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
        config: PollerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            tasks,
            releases,
            client,
            importer,
            clock,
            backoff,
            config,
            delete_files: true,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Whether rejected transfers are deleted together with their data.
    pub fn with_delete_files(mut self, delete_files: bool) -> Self {
        self.delete_files = delete_files;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the background loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Poller already running");
            return;
        }

        let poller = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let interval = Duration::from_secs(self.config.interval_secs.max(1));

        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Poller loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Poller received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !poller.running.load(Ordering::Relaxed) {
                            break;
                        }
                        let report = poller.tick().await;
                        if report != TickReport::default() {
                            debug!(?report, "Poller tick");
                        }
                    }
                }
            }
            info!("Poller loop stopped");
        });
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping poller");
        let _ = self.shutdown_tx.send(());
    }

    /// Run the three reconciliation steps once.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        match self.refresh_active().await {
            Ok(n) => report.refreshed = n,
            Err(e) => {
                warn!(error = %e, "Refreshing active tasks failed");
                report.errors += 1;
            }
        }
        match self.classify_added().await {
            Ok((classified, rejected)) => {
                report.classified = classified;
                report.rejected = rejected;
            }
            Err(e) => {
                warn!(error = %e, "Classifying added tasks failed");
                report.errors += 1;
            }
        }
        match self.import_downloaded().await {
            Ok((imported, relocated)) => {
                report.imported = imported;
                report.relocated = relocated;
            }
            Err(e) => {
                warn!(error = %e, "Importing downloaded tasks failed");
                report.errors += 1;
            }
        }

        report
    }

    /// Apply the client's view to active tasks not updated for a while.
    ///
    /// Returns the number of tasks whose status changed.
    pub async fn refresh_active(&self) -> Result<usize, PollerError> {
        let now = self.clock.now();
        let filter = TaskFilter::new()
            .with_statuses(&[
                TaskStatus::Downloading,
                TaskStatus::Queued,
                TaskStatus::Searching,
                TaskStatus::Found,
            ])
            .with_hash(true)
            .updated_before(now - chrono::Duration::seconds(self.config.stale_secs))
            .with_limit(self.config.batch_size);

        let mut changed = 0;
        for task in self.tasks.list(&filter)? {
            let Some(hash) = task.transfer_hash.clone() else {
                continue;
            };

            let info = match self.client.info(&hash).await {
                Ok(info) => info,
                Err(e) => {
                    self.record_error(&task, &e.to_string())?;
                    continue;
                }
            };

            let Some(info) = info else {
                self.fail(&task, MISSING_TRANSFER_ERROR)?;
                changed += 1;
                continue;
            };

            let next = info.task_status();
            if next == task.status {
                // Touch so the stale window moves on to other tasks.
                self.tasks.patch(&task.id, TaskPatch::new())?;
                continue;
            }

            if next == TaskStatus::Failed {
                self.fail(
                    &task,
                    &format!("Download client reports {}", info.state.as_str()),
                )?;
                changed += 1;
                continue;
            }

            match self.tasks.update_status(&task.id, next, TaskPatch::new()) {
                Ok(_) => {
                    metrics::record_transition(next);
                    changed += 1;
                    info!(
                        task_id = %task.id,
                        from = %task.status,
                        to = %next,
                        progress = info.progress,
                        "Task refreshed from download client"
                    );
                    self.advance_release(&task.id, next)?;
                }
                Err(TaskError::InvalidTransition { .. }) => {
                    debug!(task_id = %task.id, from = %task.status, to = %next, "Ignoring transition");
                    self.tasks.patch(&task.id, TaskPatch::new())?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(changed)
    }

    /// Classify the layout of added transfers. Unsupported layouts are
    /// deleted from the client.
    ///
    /// Returns `(classified, rejected)`.
    pub async fn classify_added(&self) -> Result<(usize, usize), PollerError> {
        let filter = TaskFilter::new()
            .with_statuses(&[TaskStatus::Added])
            .with_hash(true)
            .with_layout(false)
            .with_limit(self.config.batch_size);

        let mut classified = 0;
        let mut rejected = 0;

        for task in self.tasks.list(&filter)? {
            let Some(hash) = task.transfer_hash.clone() else {
                continue;
            };

            let files = match self.client.files(&hash).await {
                Ok(files) => files,
                Err(e) => {
                    self.record_error(&task, &e.to_string())?;
                    continue;
                }
            };
            if files.is_empty() {
                debug!(task_id = %task.id, "Metadata not available yet");
                continue;
            }

            let layout = classify(&files);
            if !layout.is_supported() {
                // The task stays `added` until the transfer is actually gone.
                if let Err(e) = self.client.delete(&hash, self.delete_files).await {
                    self.record_error(
                        &task,
                        &format!("Deleting rejected transfer failed: {}", e),
                    )?;
                    continue;
                }
                self.tasks.update_status(
                    &task.id,
                    TaskStatus::Invalid,
                    TaskPatch::new()
                        .layout(layout)
                        .last_error(format!("Unsupported torrent layout: {}", layout))
                        .clear_scheduled_at(),
                )?;
                metrics::record_transition(TaskStatus::Invalid);
                if let Some(release) = self.releases.latest_in_statuses(
                    &task.id,
                    &[ReleaseStatus::New, ReleaseStatus::Queued, ReleaseStatus::Downloading],
                )? {
                    self.releases
                        .set_release_status(&release.id, ReleaseStatus::Rejected)?;
                }
                warn!(task_id = %task.id, layout = %layout, "Rejected unsupported layout");
                rejected += 1;
                continue;
            }

            self.tasks.update_status(
                &task.id,
                TaskStatus::Downloading,
                TaskPatch::new().layout(layout),
            )?;
            metrics::record_transition(TaskStatus::Downloading);
            self.advance_release(&task.id, TaskStatus::Downloading)?;
            if let Err(e) = self.client.resume(&hash).await {
                self.record_error(&task, &e.to_string())?;
            }
            info!(task_id = %task.id, layout = %layout, "Layout classified, download resumed");
            classified += 1;
        }

        Ok((classified, rejected))
    }

    /// Import finished downloads and complete pending relocations.
    ///
    /// Returns `(imported, relocated)`.
    pub async fn import_downloaded(&self) -> Result<(usize, usize), PollerError> {
        let mut imported = 0;
        let downloaded = self.tasks.list(
            &TaskFilter::new()
                .with_statuses(&[TaskStatus::Downloaded])
                .with_limit(self.config.batch_size),
        )?;
        for task in downloaded {
            match self.importer.import_task(&task.id).await {
                Ok(_) => imported += 1,
                Err(e) => warn!(task_id = %task.id, error = %e, "Import failed"),
            }
        }

        let mut relocated = 0;
        let moving = self.tasks.list(
            &TaskFilter::new()
                .with_statuses(&[TaskStatus::Moving])
                .with_hash(true)
                .with_limit(self.config.batch_size),
        )?;
        for task in moving.iter().filter(|t| t.target_path.is_some()) {
            match self.importer.check_relocation(task).await {
                Ok(Some(_)) => relocated += 1,
                Ok(None) => {}
                Err(e) => self.record_error(task, &e.to_string())?,
            }
        }

        Ok((imported, relocated))
    }

    fn advance_release(&self, task_id: &str, status: TaskStatus) -> Result<(), TaskError> {
        let (from, to): (&[ReleaseStatus], ReleaseStatus) = match status {
            TaskStatus::Downloading => (
                &[ReleaseStatus::Queued, ReleaseStatus::Chosen],
                ReleaseStatus::Downloading,
            ),
            TaskStatus::Downloaded => (
                &[ReleaseStatus::Queued, ReleaseStatus::Downloading],
                ReleaseStatus::Downloaded,
            ),
            _ => return Ok(()),
        };
        if let Some(release) = self.releases.latest_in_statuses(task_id, from)? {
            self.releases.set_release_status(&release.id, to)?;
        }
        Ok(())
    }

    fn fail(&self, task: &Task, message: &str) -> Result<(), TaskError> {
        let now = self.clock.now();
        let next_at = self
            .backoff
            .next_retry_at(now, task.scheduled_at, task.last_tried_at);
        self.tasks.update_status(
            &task.id,
            TaskStatus::Failed,
            TaskPatch::new()
                .last_error(message)
                .scheduled_at(next_at)
                .last_tried_at(now),
        )?;
        metrics::record_transition(TaskStatus::Failed);
        warn!(task_id = %task.id, error = %message, "Task failed during refresh");
        Ok(())
    }

    /// Per-task errors only record `lastError`.
    fn record_error(&self, task: &Task, message: &str) -> Result<(), TaskError> {
        warn!(task_id = %task.id, error = %message, "Poller error");
        self.tasks
            .patch(&task.id, TaskPatch::new().last_error(message))?;
        Ok(())
    }
}

//! Moving a finished download into the music library.
//!
//! The importer resolves where the transfer's files live, renders the album
//! directory from the naming patterns and then either cuts a CUE image into
//! tracks or copies the audio with renaming, depending on the classified
//! layout. Tasks with a target path override are relocated by the download
//! client instead.

mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::LibraryConfig;
use crate::cue::{AlbumMeta, CueError, CueSplitter, SplitJob};
use crate::download_client::{DownloadClient, DownloadClientError, TransferFile};
use crate::layout::{classify, pick_album_dir, Layout};
use crate::metrics;
use crate::placer::{
    album_dir, copy_with_renaming, first_non_empty, path_exists, sanitize_name, FileMode,
    NamingPatterns, PlacementReport, PlacerError,
};
use crate::task::{BackoffPolicy, Task, TaskError, TaskPatch, TaskStatus, TaskStore};

pub use source::{files_under, join_relative, strip_common_root, walk_files};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Unsupported torrent layout: {0}")]
    UnsupportedLayout(Layout),

    #[error("Task {0} has no transfer hash")]
    MissingHash(String),

    #[error("Download client: {0}")]
    Client(#[from] DownloadClientError),

    #[error(transparent)]
    Cue(#[from] CueError),

    #[error(transparent)]
    Placer(#[from] PlacerError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_retryable(),
            Self::Cue(e) => e.is_retryable(),
            Self::Placer(e) => e.is_retryable(),
            Self::SourceNotFound(_) | Self::Io(_) => true,
            _ => false,
        }
    }
}

/// Where and how the library is written.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub library_root: PathBuf,
    /// Fallback location of downloads the client no longer reports.
    pub downloads_dir: PathBuf,
    pub patterns: NamingPatterns,
    pub mode: FileMode,
}

impl ImportSettings {
    pub fn from_library(library: &LibraryConfig) -> Self {
        Self {
            library_root: library.root.clone(),
            downloads_dir: library.downloads_dir.clone(),
            patterns: NamingPatterns::from_library(library),
            mode: library.file_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    /// Files are in the library; the task is `moved`.
    Imported {
        task: Task,
        album_dir: PathBuf,
        report: PlacementReport,
    },
    /// The client was asked to move the data; the task is `moving`.
    Relocating { task: Task },
}

impl ImportOutcome {
    pub fn task(&self) -> &Task {
        match self {
            ImportOutcome::Imported { task, .. } | ImportOutcome::Relocating { task } => task,
        }
    }
}

pub struct LibraryImporter {
    tasks: Arc<dyn TaskStore>,
    client: Arc<dyn DownloadClient>,
    splitter: CueSplitter,
    clock: Arc<dyn Clock>,
    backoff: BackoffPolicy,
    settings: ImportSettings,
}

impl LibraryImporter {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        client: Arc<dyn DownloadClient>,
        splitter: CueSplitter,
        clock: Arc<dyn Clock>,
        backoff: BackoffPolicy,
        settings: ImportSettings,
    ) -> Self {
        Self {
            tasks,
            client,
            splitter,
            clock,
            backoff,
            settings,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Import one downloaded task. A failure marks the task `failed` with
    /// backoff and is returned.
    pub async fn import_task(&self, task_id: &str) -> Result<ImportOutcome, ImportError> {
        let task = self
            .tasks
            .get(task_id)?
            .ok_or_else(|| ImportError::TaskNotFound(task_id.to_string()))?;

        if let Some(target) = target_path(&task) {
            return self.relocate(&task, target).await;
        }

        self.tasks
            .update_status(task_id, TaskStatus::Moving, TaskPatch::new())?;
        metrics::record_transition(TaskStatus::Moving);

        match self.place(&task).await {
            Ok((album_dir, report)) => {
                let now = self.clock.now();
                let task = self.tasks.update_status(
                    task_id,
                    TaskStatus::Moved,
                    TaskPatch::new()
                        .final_path(album_dir.to_string_lossy().to_string())
                        .finished_at(now)
                        .clear_last_error()
                        .clear_scheduled_at(),
                )?;
                metrics::record_transition(TaskStatus::Moved);
                info!(
                    task_id = %task_id,
                    album_dir = %album_dir.display(),
                    placed = report.placed,
                    skipped = report.skipped,
                    "Imported into library"
                );
                Ok(ImportOutcome::Imported {
                    task,
                    album_dir,
                    report,
                })
            }
            Err(e) => {
                self.fail(&task, &e)?;
                Err(e)
            }
        }
    }

    /// Finish a relocation once the client reports the new save path.
    ///
    /// Returns the `moved` task, or `None` while the move is still pending.
    pub async fn check_relocation(&self, task: &Task) -> Result<Option<Task>, ImportError> {
        let Some(target) = target_path(task) else {
            return Ok(None);
        };
        let hash = task
            .transfer_hash
            .as_deref()
            .ok_or_else(|| ImportError::MissingHash(task.id.clone()))?;

        let Some(info) = self.client.info(hash).await? else {
            return Ok(None);
        };
        if info.save_path.as_deref().map(trim_slash) != Some(trim_slash(target)) {
            debug!(task_id = %task.id, save_path = ?info.save_path, "Relocation pending");
            return Ok(None);
        }

        let task = self.tasks.update_status(
            &task.id,
            TaskStatus::Moved,
            TaskPatch::new()
                .final_path(target)
                .finished_at(self.clock.now())
                .clear_last_error(),
        )?;
        metrics::record_transition(TaskStatus::Moved);
        info!(task_id = %task.id, target = %target, "Relocation finished");
        Ok(Some(task))
    }

    async fn relocate(&self, task: &Task, target: &str) -> Result<ImportOutcome, ImportError> {
        let hash = task
            .transfer_hash
            .as_deref()
            .ok_or_else(|| ImportError::MissingHash(task.id.clone()))?;

        if let Err(e) = self.client.set_location(hash, target).await {
            let e = ImportError::from(e);
            self.fail(task, &e)?;
            return Err(e);
        }

        let task = self
            .tasks
            .update_status(&task.id, TaskStatus::Moving, TaskPatch::new().clear_last_error())?;
        metrics::record_transition(TaskStatus::Moving);
        info!(task_id = %task.id, target = %target, "Relocating transfer");
        Ok(ImportOutcome::Relocating { task })
    }

    async fn place(&self, task: &Task) -> Result<(PathBuf, PlacementReport), ImportError> {
        let (source_base, mut files) = self.locate_source(task).await?;
        if !path_exists(&source_base).await {
            return Err(ImportError::SourceNotFound(source_base));
        }
        if files.is_empty() {
            files = walk_files(&source_base).await?;
        }

        let layout = task.layout.unwrap_or_else(|| classify(&files));
        let album_dir = album_dir(
            &self.settings.library_root,
            &self.settings.patterns.artist,
            &self.settings.patterns.album,
            task.artist.as_deref(),
            task.album.as_deref(),
            task.year,
        );
        debug!(
            task_id = %task.id,
            layout = %layout,
            source = %source_base.display(),
            files = files.len(),
            "Placing download"
        );

        let report = match layout {
            Layout::SingleFileCue => {
                let names = names(&files);
                let meta = AlbumMeta {
                    artist: task.artist.clone(),
                    album: task.album.clone(),
                    year: task.year,
                    genre: None,
                };
                self.splitter
                    .split(SplitJob {
                        source_base: &source_base,
                        files: &names,
                        album_dir: &album_dir,
                        patterns: &self.settings.patterns,
                        policy: task.collision_policy,
                        mode: self.settings.mode,
                        meta: &meta,
                    })
                    .await?
            }
            Layout::SimpleAlbum | Layout::MultiFileCue => {
                self.copy(task, &files, &source_base, &album_dir).await?
            }
            Layout::MultiAlbum => {
                let title = first_non_empty([task.album.as_deref(), task.query.as_deref()])
                    .unwrap_or_default();
                match pick_album_dir(&files, &title, task.year) {
                    Some(dir) => {
                        let picked = files_under(&files, &dir);
                        if picked.is_empty() {
                            self.copy(task, &files, &source_base, &album_dir).await?
                        } else {
                            info!(task_id = %task.id, dir = %dir, "Picked album from bundle");
                            let base = join_relative(&source_base, &dir);
                            self.copy(task, &picked, &base, &album_dir).await?
                        }
                    }
                    None => self.copy(task, &files, &source_base, &album_dir).await?,
                }
            }
            Layout::MultiAlbumCue | Layout::Invalid => {
                return Err(ImportError::UnsupportedLayout(layout))
            }
        };

        Ok((album_dir, report))
    }

    async fn copy(
        &self,
        task: &Task,
        files: &[TransferFile],
        source_base: &Path,
        album_dir: &Path,
    ) -> Result<PlacementReport, ImportError> {
        Ok(copy_with_renaming(
            &names(files),
            source_base,
            album_dir,
            &self.settings.patterns,
            self.settings.mode,
            task.collision_policy,
        )
        .await?)
    }

    /// The transfer's save path joined with its common root, or the
    /// downloads directory joined with the task title.
    async fn locate_source(&self, task: &Task) -> Result<(PathBuf, Vec<TransferFile>), ImportError> {
        if let Some(hash) = task.transfer_hash.as_deref() {
            if let Some(save_path) = self.client.info(hash).await?.and_then(|i| i.save_path) {
                let files = match self.client.files(hash).await {
                    Ok(files) => files,
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Could not list transfer files");
                        Vec::new()
                    }
                };
                let (root, relative) = strip_common_root(&files);
                let base = match root {
                    Some(root) => join_relative(Path::new(&save_path), &root),
                    None => PathBuf::from(save_path),
                };
                return Ok((base, relative));
            }
        }

        let title = first_non_empty([task.album.as_deref(), task.query.as_deref()])
            .unwrap_or_else(|| format!("task-{}", task.id));
        Ok((self.settings.downloads_dir.join(sanitize_name(&title)), Vec::new()))
    }

    fn fail(&self, task: &Task, error: &ImportError) -> Result<Task, TaskError> {
        let now = self.clock.now();
        let next_at = self
            .backoff
            .next_retry_at(now, task.scheduled_at, task.last_tried_at);
        let failed = self.tasks.update_status(
            &task.id,
            TaskStatus::Failed,
            TaskPatch::new()
                .last_error(error.to_string())
                .scheduled_at(next_at)
                .last_tried_at(now),
        )?;
        metrics::record_transition(TaskStatus::Failed);
        warn!(task_id = %task.id, error = %error, "Import failed");
        Ok(failed)
    }
}

fn target_path(task: &Task) -> Option<&str> {
    task.target_path.as_deref().filter(|p| !p.trim().is_empty())
}

fn trim_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        path
    } else {
        trimmed
    }
}

fn names(files: &[TransferFile]) -> Vec<String> {
    files.iter().map(|f| f.name.clone()).collect()
}

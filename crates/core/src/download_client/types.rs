//! Types for download client operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskStatus;

/// Errors that can occur talking to the download client.
#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Torrent download failed: {0}")]
    FetchFailed(String),

    #[error("Request timeout")]
    Timeout,
}

impl DownloadClientError {
    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadClientError::ConnectionFailed(_)
                | DownloadClientError::Timeout
                | DownloadClientError::FetchFailed(_)
        )
    }
}

/// Remote state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Downloading,
    /// Fetching metadata for a magnet.
    Metadata,
    Seeding,
    Paused,
    Checking,
    Queued,
    Stalled,
    Error,
    MissingFiles,
    Unknown,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Downloading => "downloading",
            TransferState::Metadata => "metadata",
            TransferState::Seeding => "seeding",
            TransferState::Paused => "paused",
            TransferState::Checking => "checking",
            TransferState::Queued => "queued",
            TransferState::Stalled => "stalled",
            TransferState::Error => "error",
            TransferState::MissingFiles => "missing_files",
            TransferState::Unknown => "unknown",
        }
    }
}

/// A transfer as reported by the download client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferInfo {
    /// Upper-case hex info hash.
    pub hash: String,
    pub name: String,
    pub state: TransferState,
    /// 0.0 - 1.0
    pub progress: f64,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TransferInfo {
    /// Task status implied by this transfer's state.
    pub fn task_status(&self) -> TaskStatus {
        map_transfer_status(self.state, self.progress)
    }
}

/// Map a remote transfer state onto the task lifecycle.
pub fn map_transfer_status(state: TransferState, progress: f64) -> TaskStatus {
    if progress >= 1.0 {
        return TaskStatus::Downloaded;
    }

    match state {
        TransferState::Error | TransferState::MissingFiles => TaskStatus::Failed,
        TransferState::Paused if progress > 0.0 => TaskStatus::Downloading,
        TransferState::Paused => TaskStatus::Added,
        TransferState::Downloading
        | TransferState::Stalled
        | TransferState::Metadata
        | TransferState::Checking => TaskStatus::Downloading,
        TransferState::Queued => TaskStatus::Queued,
        TransferState::Seeding => TaskStatus::Downloaded,
        TransferState::Unknown => TaskStatus::Downloading,
    }
}

/// One file inside a transfer. `name` is relative to the save path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferFile {
    pub name: String,
    pub size: u64,
}

impl TransferFile {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// What to hand to the download client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferSource {
    Magnet(String),
    /// HTTP link to a `.torrent` file, fetched by the client itself.
    Url(String),
}

impl TransferSource {
    pub fn as_str(&self) -> &str {
        match self {
            TransferSource::Magnet(uri) | TransferSource::Url(uri) => uri,
        }
    }
}

/// Request to add a new transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTransferRequest {
    pub source: TransferSource,
    pub save_path: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub paused: bool,
}

impl AddTransferRequest {
    pub fn new(source: TransferSource) -> Self {
        Self {
            source,
            save_path: None,
            category: None,
            tags: None,
            paused: false,
        }
    }

    pub fn with_save_path(mut self, path: Option<String>) -> Self {
        self.save_path = path;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_tags(mut self, tags: Option<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }
}

/// Trait for download client backends.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn add(&self, request: AddTransferRequest) -> Result<(), DownloadClientError>;

    /// All transfers, optionally limited to one category.
    async fn list(&self, category: Option<&str>) -> Result<Vec<TransferInfo>, DownloadClientError>;

    /// `None` when the client does not know the hash.
    async fn info(&self, hash: &str) -> Result<Option<TransferInfo>, DownloadClientError>;

    async fn files(&self, hash: &str) -> Result<Vec<TransferFile>, DownloadClientError>;

    /// Move a transfer's data to `location`.
    async fn set_location(&self, hash: &str, location: &str) -> Result<(), DownloadClientError>;

    async fn delete(&self, hash: &str, delete_files: bool) -> Result<(), DownloadClientError>;

    async fn resume(&self, hash: &str) -> Result<(), DownloadClientError>;
}

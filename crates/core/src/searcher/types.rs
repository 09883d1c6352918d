//! Types for indexer searches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::indexer::{Indexer, IndexerError};
use crate::task::{NewRelease, TaskError};

/// One `<item>` of a Torznab feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
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

impl FeedItem {
    pub fn into_release(self, indexer_id: i64) -> NewRelease {
        NewRelease {
            indexer_id,
            title: self.title,
            guid: self.guid,
            link: self.link,
            magnet: self.magnet,
            info_hash: self.info_hash,
            size_bytes: self.size_bytes,
            seeders: self.seeders,
            leechers: self.leechers,
            published_at: self.published_at,
            quality: self.quality,
            category: self.category,
            external_score: self.external_score,
        }
    }
}

/// A search request sent to one indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub query: String,
    /// Result-count cap sent as `limit=`.
    pub limit: Option<u32>,
}

/// Aggregate result of searching all available indexers for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchOutcome {
    /// At least one release was saved.
    Ok,
    /// Every queried indexer answered, none returned hits.
    Empty,
    /// Every queried indexer failed.
    IndexerError,
    /// No indexer was available.
    NoIndexers,
}

impl SearchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOutcome::Ok => "ok",
            SearchOutcome::Empty => "empty",
            SearchOutcome::IndexerError => "indexer-error",
            SearchOutcome::NoIndexers => "no-indexers",
        }
    }

    /// Outcomes that say nothing about the task and everything about the indexers.
    pub fn halts_run(&self) -> bool {
        matches!(self, SearchOutcome::IndexerError | SearchOutcome::NoIndexers)
    }
}

/// What one indexer did during a task search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexerSearchResult {
    pub indexer_id: i64,
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub found: usize,
}

/// Result of `SearchService::search_task`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub task_id: String,
    pub outcome: SearchOutcome,
    pub saved: usize,
    pub per_indexer: Vec<IndexerSearchResult>,
}

/// Errors from searching.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP {0}")]
    HttpStatus(String),

    #[error("Indexer API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task has no query: {0}")]
    MissingQuery(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

impl SearchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::ConnectionFailed(_) | SearchError::HttpStatus(_) | SearchError::Timeout
        )
    }
}

/// A Torznab-speaking backend.
#[async_trait]
pub trait IndexerFeed: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Query one indexer and parse its feed.
    async fn fetch(
        &self,
        indexer: &Indexer,
        request: &FeedRequest,
    ) -> Result<Vec<FeedItem>, SearchError>;
}

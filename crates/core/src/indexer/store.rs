use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::IndexerConfig;

use super::Indexer;

/// Errors from indexer storage and availability checks.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Indexer not found: {0}")]
    NotFound(i64),

    #[error(
        "No available indexers (enabled={enabled}, cooldown={cooldown}, disabled={disabled}, nextAt={})",
        display_time(.next_at)
    )]
    Unavailable {
        enabled: usize,
        cooldown: usize,
        disabled: usize,
        next_at: Option<DateTime<Utc>>,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl IndexerError {
    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexerError::Database(_))
    }
}

fn display_time(at: &Option<DateTime<Utc>>) -> String {
    at.map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

/// Health fields written after a search outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerHealth {
    pub enabled: bool,
    pub error_count: u32,
    pub temp_disabled_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Storage for indexers.
pub trait IndexerStore: Send + Sync {
    /// All indexers ordered by `(order, id)`.
    fn list_all(&self) -> Result<Vec<Indexer>, IndexerError>;

    fn get(&self, id: i64) -> Result<Option<Indexer>, IndexerError>;

    /// Insert or update an indexer by name. Health fields of an existing row
    /// are left alone.
    fn upsert_config(&self, config: &IndexerConfig) -> Result<Indexer, IndexerError>;

    fn set_health(&self, id: i64, health: &IndexerHealth) -> Result<Indexer, IndexerError>;

    /// Manual enable/disable. Enabling also clears the error counter and cooldown.
    fn set_enabled(&self, id: i64, enabled: bool) -> Result<Indexer, IndexerError>;
}

//! Indexer records and availability snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured Torznab search backend and its health counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indexer {
    pub id: i64,
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub enabled: bool,
    /// Torznab category ids sent as `cat=`.
    pub categories: Vec<String>,
    /// Lower values are queried first.
    pub order: i32,
    pub error_count: u32,
    pub temp_disabled_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Indexer {
    /// Enabled and not cooling down at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.is_cooling_down(now)
    }

    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.temp_disabled_until.is_some_and(|until| until > now)
    }
}

/// An indexer suspended until `until`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooldownEntry {
    pub id: i64,
    pub name: String,
    pub until: DateTime<Utc>,
}

/// Point-in-time view of indexer availability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilitySnapshot {
    pub total: usize,
    pub enabled: usize,
    pub available: usize,
    pub cooldown: usize,
    pub disabled: usize,
    /// Earliest time a cooled-down indexer comes back.
    pub next_available_at: Option<DateTime<Utc>>,
    pub cooldowns: Vec<CooldownEntry>,
}

impl AvailabilitySnapshot {
    pub fn is_available(&self) -> bool {
        self.available > 0
    }
}

//! Per-indexer error counting, cooldown and disablement.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::metrics;

use super::{AvailabilitySnapshot, CooldownEntry, Indexer, IndexerError, IndexerHealth, IndexerStore};

/// Error counts that trigger a cooldown or a permanent disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// The error count at which the indexer is cooled down.
    #[serde(default = "default_cooldown_after")]
    pub cooldown_after: u32,
    /// The error count at or above which an enabled indexer is disabled.
    #[serde(default = "default_disable_after")]
    pub disable_after: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
}

fn default_cooldown_after() -> u32 {
    10
}

fn default_disable_after() -> u32 {
    20
}

fn default_cooldown_minutes() -> i64 {
    60
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cooldown_after: default_cooldown_after(),
            disable_after: default_disable_after(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

/// Tracks indexer health and answers availability questions.
pub struct HealthTracker {
    store: Arc<dyn IndexerStore>,
    clock: Arc<dyn Clock>,
    thresholds: HealthThresholds,
}

impl HealthTracker {
    pub fn new(
        store: Arc<dyn IndexerStore>,
        clock: Arc<dyn Clock>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            store,
            clock,
            thresholds,
        }
    }

    pub fn store(&self) -> &Arc<dyn IndexerStore> {
        &self.store
    }

    /// Record the result of one request to an indexer. `error` is `None` on success.
    pub fn record_outcome(
        &self,
        indexer_id: i64,
        error: Option<&str>,
    ) -> Result<Indexer, IndexerError> {
        let indexer = self
            .store
            .get(indexer_id)?
            .ok_or(IndexerError::NotFound(indexer_id))?;

        let Some(message) = error else {
            if indexer.error_count == 0 && indexer.temp_disabled_until.is_none() {
                return Ok(indexer);
            }
            return self.store.set_health(
                indexer_id,
                &IndexerHealth {
                    enabled: indexer.enabled,
                    error_count: 0,
                    temp_disabled_until: None,
                    last_error: indexer.last_error.clone(),
                },
            );
        };

        metrics::INDEXER_FAILURES
            .with_label_values(&[indexer.name.as_str()])
            .inc();

        let error_count = indexer.error_count.saturating_add(1);
        let mut health = IndexerHealth {
            enabled: indexer.enabled,
            error_count,
            temp_disabled_until: indexer.temp_disabled_until,
            last_error: Some(message.to_string()),
        };

        if error_count == self.thresholds.cooldown_after {
            let until = self.clock.now() + Duration::minutes(self.thresholds.cooldown_minutes);
            health.temp_disabled_until = Some(until);
            metrics::INDEXER_STATE_CHANGES
                .with_label_values(&["cooldown"])
                .inc();
            warn!(
                indexer_id,
                indexer = %indexer.name,
                error_count,
                until = %until,
                last_error = %message,
                "Indexer moved to cooldown"
            );
        } else if error_count >= self.thresholds.disable_after && indexer.enabled {
            health.enabled = false;
            metrics::INDEXER_STATE_CHANGES
                .with_label_values(&["disabled"])
                .inc();
            error!(
                indexer_id,
                indexer = %indexer.name,
                error_count,
                last_error = %message,
                "Indexer disabled after repeated errors"
            );
        }

        self.store.set_health(indexer_id, &health)
    }

    /// Enabled indexers that are not cooling down, in query order.
    pub fn list_available(&self) -> Result<Vec<Indexer>, IndexerError> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_all()?
            .into_iter()
            .filter(|i| i.is_available(now))
            .collect())
    }

    pub fn availability(&self) -> Result<AvailabilitySnapshot, IndexerError> {
        let now = self.clock.now();
        Ok(snapshot(&self.store.list_all()?, now))
    }

    /// The available indexers, or `IndexerError::Unavailable` when there are none.
    pub fn ensure_available(&self) -> Result<Vec<Indexer>, IndexerError> {
        let now = self.clock.now();
        let all = self.store.list_all()?;
        let snap = snapshot(&all, now);

        if !snap.is_available() {
            return Err(IndexerError::Unavailable {
                enabled: snap.enabled,
                cooldown: snap.cooldown,
                disabled: snap.disabled,
                next_at: snap.next_available_at,
            });
        }

        Ok(all.into_iter().filter(|i| i.is_available(now)).collect())
    }

    /// Manual re-enable.
    pub fn enable(&self, indexer_id: i64) -> Result<Indexer, IndexerError> {
        let indexer = self.store.set_enabled(indexer_id, true)?;
        info!(indexer_id, indexer = %indexer.name, "Indexer re-enabled");
        Ok(indexer)
    }
}

fn snapshot(indexers: &[Indexer], now: DateTime<Utc>) -> AvailabilitySnapshot {
    let mut snap = AvailabilitySnapshot {
        total: indexers.len(),
        enabled: 0,
        available: 0,
        cooldown: 0,
        disabled: 0,
        next_available_at: None,
        cooldowns: Vec::new(),
    };

    for indexer in indexers {
        if !indexer.enabled {
            snap.disabled += 1;
            continue;
        }
        snap.enabled += 1;

        match indexer.temp_disabled_until {
            Some(until) if until > now => {
                snap.cooldown += 1;
                snap.next_available_at = Some(match snap.next_available_at {
                    Some(current) => current.min(until),
                    None => until,
                });
                snap.cooldowns.push(CooldownEntry {
                    id: indexer.id,
                    name: indexer.name.clone(),
                    until,
                });
            }
            _ => snap.available += 1,
        }
    }

    snap
}

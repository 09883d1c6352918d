//! Configured search backends and their health.
//!
//! Every failed request increments an indexer's error counter. At the cooldown
//! threshold the indexer is suspended for a while; at the disable threshold it
//! is switched off until someone re-enables it. Any success resets the counter.

mod health;
mod sqlite_store;
mod store;
mod types;

pub use health::{HealthThresholds, HealthTracker};
pub use sqlite_store::SqliteIndexerStore;
pub use store::{IndexerError, IndexerHealth, IndexerStore};
pub use types::{AvailabilitySnapshot, CooldownEntry, Indexer};

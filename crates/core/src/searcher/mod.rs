//! Torznab search.
//!
//! This module provides the `IndexerFeed` trait for querying one Torznab
//! endpoint, the feed parser, and the `SearchService` that runs a task's query
//! against every available indexer, stores the hits and feeds indexer health.

mod feed;
mod service;
mod torznab;
mod types;

pub use feed::parse_feed;
pub use service::{SearchService, EMPTY_RETRY_MINUTES};
pub use torznab::TorznabClient;
pub use types::*;

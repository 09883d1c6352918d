//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Indexer searches and indexer health
//! - Download client submissions and hash resolution
//! - Task status transitions
//! - Library import (tracks split, files placed)
//!
//! The server registers these into its registry.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Search
// =============================================================================

/// Task searches by outcome.
pub static SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvest_searches_total", "Total task searches"),
        &["outcome"], // "found", "empty", "indexer_error", "no_indexers"
    )
    .unwrap()
});

/// Per-indexer request failures.
pub static INDEXER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_indexer_failures_total",
            "Total failed indexer requests",
        ),
        &["indexer"],
    )
    .unwrap()
});

/// Indexer health state changes.
pub static INDEXER_STATE_CHANGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_indexer_state_changes_total",
            "Indexers moved to cooldown or disabled",
        ),
        &["state"], // "cooldown", "disabled"
    )
    .unwrap()
});

/// Indexer request duration in seconds.
pub static INDEXER_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "harvest_indexer_request_duration_seconds",
            "Duration of Torznab requests",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["indexer"],
    )
    .unwrap()
});

// =============================================================================
// Download client
// =============================================================================

/// Transfers accepted by the download client.
pub static TRANSFERS_ADDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "harvest_transfers_added_total",
        "Transfers submitted to the download client",
    )
    .unwrap()
});

/// Hash resolutions by method.
pub static HASH_RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_hash_resolutions_total",
            "Transfer hash resolutions",
        ),
        &["method"], // "magnet", "torrent_file", "poll", "none"
    )
    .unwrap()
});

// =============================================================================
// Tasks
// =============================================================================

/// Task status transitions by target status.
pub static TASK_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_task_transitions_total",
            "Task status transitions",
        ),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Library import
// =============================================================================

/// Tracks cut from single-file CUE images.
pub static TRACKS_SPLIT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("harvest_tracks_split_total", "Tracks split from CUE images").unwrap()
});

/// Files placed into the library.
pub static FILES_PLACED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvest_files_placed_total", "Files placed into the library"),
        &["result"], // "placed", "skipped"
    )
    .unwrap()
});

/// Count a status transition.
pub fn record_transition(status: crate::task::TaskStatus) {
    TASK_TRANSITIONS.with_label_values(&[status.as_str()]).inc();
}

/// All core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Search
        Box::new(SEARCHES.clone()),
        Box::new(INDEXER_FAILURES.clone()),
        Box::new(INDEXER_STATE_CHANGES.clone()),
        Box::new(INDEXER_REQUEST_DURATION.clone()),
        // Download client
        Box::new(TRANSFERS_ADDED.clone()),
        Box::new(HASH_RESOLUTIONS.clone()),
        // Tasks
        Box::new(TASK_TRANSITIONS.clone()),
        // Library import
        Box::new(TRACKS_SPLIT.clone()),
        Box::new(FILES_PLACED.clone()),
    ]
}

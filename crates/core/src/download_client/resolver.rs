//! Transfer identifier resolution.
//!
//! The hash comes from the magnet when there is one, else from hashing the
//! `.torrent` file behind the direct link. When neither works the client's
//! transfer list is polled for the transfer whose name best matches the
//! release.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::matching::tokens_similarity;
use crate::task::{Release, Task};

use super::bencode::info_hash;
use super::magnet::parse_magnet_hash;
use super::{DownloadClient, TorrentFetcher, TransferInfo};

/// Tuning for the polling fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Transfers added more than this long before submission are ignored.
    #[serde(default = "default_added_window_secs")]
    pub added_window_secs: i64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_attempts() -> u32 {
    15
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_added_window_secs() -> i64 {
    120
}

fn default_similarity_threshold() -> f64 {
    0.45
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            added_window_secs: default_added_window_secs(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// How a hash was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMethod {
    Magnet,
    TorrentFile,
    Poll,
}

impl HashMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashMethod::Magnet => "magnet",
            HashMethod::TorrentFile => "torrent_file",
            HashMethod::Poll => "poll",
        }
    }
}

/// Names a submitted transfer is expected to resemble.
#[derive(Debug, Clone, Default)]
pub struct MatchHints {
    pub release_title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
}

impl MatchHints {
    pub fn new(task: &Task, release: &Release) -> Self {
        Self {
            release_title: Some(release.title.clone()),
            album: task.album.clone(),
            artist: task.artist.clone(),
        }
    }

    fn references(&self) -> impl Iterator<Item = &str> {
        [&self.release_title, &self.album, &self.artist]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Best similarity between a transfer's name (or content path basename) and
/// any of the hints.
pub fn candidate_score(transfer: &TransferInfo, hints: &MatchHints) -> f64 {
    let basename = transfer
        .content_path
        .as_deref()
        .and_then(|p| p.split(['/', '\\']).filter(|s| !s.is_empty()).last());

    let names = std::iter::once(transfer.name.as_str()).chain(basename);

    names
        .filter(|n| !n.is_empty())
        .flat_map(|name| hints.references().map(move |r| tokens_similarity(r, name)))
        .fold(0.0, f64::max)
}

pub struct HashResolver {
    fetcher: Arc<dyn TorrentFetcher>,
    config: ResolverConfig,
}

impl HashResolver {
    pub fn new(fetcher: Arc<dyn TorrentFetcher>, config: ResolverConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Hash known before submission: from the magnet, else from the `.torrent`
    /// behind an `http(s)` link. Fetch and parse failures are logged and yield `None`.
    pub async fn precompute(&self, release: &Release) -> Option<(String, HashMethod)> {
        if let Some(hash) = release.magnet.as_deref().and_then(parse_magnet_hash) {
            return Some((hash, HashMethod::Magnet));
        }

        let link = release.link.as_deref()?;
        let lower = link.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return None;
        }

        let bytes = match self.fetcher.fetch(link).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(release_id = %release.id, error = %e, "Failed to download torrent file");
                return None;
            }
        };

        match info_hash(&bytes) {
            Ok(hash) => Some((hash, HashMethod::TorrentFile)),
            Err(e) => {
                warn!(release_id = %release.id, error = %e, "Failed to compute info hash");
                None
            }
        }
    }

    /// Poll the client's transfer list for the transfer just submitted.
    ///
    /// Only transfers added no earlier than `added_window_secs` before
    /// `submitted_at` and scoring at least `similarity_threshold` qualify.
    pub async fn poll(
        &self,
        client: &dyn DownloadClient,
        category: Option<&str>,
        hints: &MatchHints,
        submitted_at: DateTime<Utc>,
    ) -> Option<String> {
        let min_added = submitted_at - chrono::Duration::seconds(self.config.added_window_secs);

        for attempt in 1..=self.config.attempts {
            match client.list(category).await {
                Ok(transfers) => {
                    if let Some((hash, score)) = self.best_match(&transfers, hints, min_added) {
                        info!(hash = %hash, attempt, score, "Resolved transfer hash by name");
                        return Some(hash);
                    }
                    debug!(attempt, candidates = transfers.len(), "No confident transfer match yet");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Failed to list transfers");
                }
            }

            if attempt < self.config.attempts && self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }
        }

        None
    }

    fn best_match(
        &self,
        transfers: &[TransferInfo],
        hints: &MatchHints,
        min_added: DateTime<Utc>,
    ) -> Option<(String, f64)> {
        let mut best: Option<(&TransferInfo, f64)> = None;

        for transfer in transfers {
            if transfer.added_at.is_some_and(|at| at < min_added) {
                continue;
            }
            let score = candidate_score(transfer, hints);
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((transfer, score));
            }
        }

        best.filter(|(_, score)| *score >= self.config.similarity_threshold)
            .map(|(t, score)| (t.hash.to_uppercase(), score))
    }
}

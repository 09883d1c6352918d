//! Testing utilities and mock implementations of the external seams.
//!
//! The mocks stand in for the download client, Torznab indexers, `.torrent`
//! downloads, ffmpeg and the wanted catalog so the whole pipeline can run in
//! tests against in-memory SQLite.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvest_core::testing::{MockDownloadClient, MockIndexerFeed};
//!
//! let feed = MockIndexerFeed::new();
//! feed.set_results("rutracker", vec![/* feed items */]).await;
//!
//! let client = MockDownloadClient::new();
//! client.add_transfer(info, files).await;
//! ```

mod memory_catalog;
mod mock_cutter;
mod mock_download_client;
mod mock_indexer_feed;
mod mock_torrent_fetcher;

pub use memory_catalog::MemoryCatalog;
pub use mock_cutter::MockCutter;
pub use mock_download_client::MockDownloadClient;
pub use mock_indexer_feed::MockIndexerFeed;
pub use mock_torrent_fetcher::MockTorrentFetcher;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{TimeZone, Utc};

    use crate::config::IndexerConfig;
    use crate::download_client::{TransferInfo, TransferState};
    use crate::placer::CollisionPolicy;
    use crate::searcher::FeedItem;
    use crate::task::{Release, ReleaseStatus, Scope, Task, TaskSource, TaskStatus};

    fn epoch() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// An album task for "Pink Floyd - The Wall" in the given status.
    pub fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            dedup_key: "album|pink floyd|the wall|1979".to_string(),
            scope: Scope::Album,
            artist: Some("Pink Floyd".to_string()),
            album: Some("The Wall".to_string()),
            year: Some(1979),
            query: Some("Pink Floyd - The Wall - 1979 FLAC".to_string()),
            ext_artist_id: None,
            ext_album_id: None,
            source: TaskSource::Auto,
            collision_policy: CollisionPolicy::default(),
            min_seeders: None,
            max_releases_per_indexer: None,
            preferred_indexer_id: None,
            target_path: None,
            status,
            transfer_hash: None,
            layout: None,
            final_path: None,
            last_error: None,
            created_at: epoch(),
            updated_at: epoch(),
            started_at: None,
            finished_at: None,
            last_tried_at: None,
            scheduled_at: None,
        }
    }

    /// A release without seeders, magnet or publish date.
    pub fn release(id: &str, title: &str) -> Release {
        Release {
            id: id.to_string(),
            seq: 1,
            task_id: "task-1".to_string(),
            indexer_id: 1,
            title: title.to_string(),
            guid: None,
            link: None,
            magnet: None,
            info_hash: None,
            size_bytes: None,
            seeders: None,
            leechers: None,
            published_at: None,
            quality: None,
            category: None,
            external_score: None,
            score: None,
            status: ReleaseStatus::New,
            created_at: epoch(),
        }
    }

    pub fn indexer_config(name: &str, order: i32) -> IndexerConfig {
        IndexerConfig {
            name: name.to_string(),
            base_url: format!("http://jackett:9117/api/v2.0/indexers/{}/results/torznab", name),
            api_key: "test-key".to_string(),
            enabled: true,
            categories: vec!["3000".to_string()],
            order,
        }
    }

    /// A feed hit with a magnet link.
    pub fn feed_item(title: &str, hash: &str, seeders: i64) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            guid: Some(format!("guid-{}", hash.to_lowercase())),
            magnet: Some(format!("magnet:?xt=urn:btih:{}", hash)),
            info_hash: Some(hash.to_uppercase()),
            size_bytes: Some(400 * 1024 * 1024),
            seeders: Some(seeders),
            leechers: Some(1),
            category: Some("3000".to_string()),
            ..Default::default()
        }
    }

    /// A transfer as the client reports it right after a paused add.
    pub fn transfer(hash: &str, name: &str, save_path: &str) -> TransferInfo {
        TransferInfo {
            hash: hash.to_uppercase(),
            name: name.to_string(),
            state: TransferState::Paused,
            progress: 0.0,
            size_bytes: 400 * 1024 * 1024,
            save_path: Some(save_path.to_string()),
            content_path: None,
            added_at: None,
            category: Some("music".to_string()),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cue::CutterConfig;
use crate::download_client::ResolverConfig;
use crate::indexer::HealthThresholds;
use crate::placer::{CollisionPolicy, FileMode};
use crate::task::BackoffPolicy;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub indexers: Vec<IndexerConfig>,
    pub download_client: DownloadClientConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub health: HealthThresholds,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub cutter: CutterConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("harvest.db")
}

/// One Torznab indexer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct IndexerConfig {
    /// Unique name; indexers are seeded by name.
    pub name: String,
    /// Torznab endpoint without the trailing `/api`.
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Torznab category ids (3000 is Audio).
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Lower runs first.
    #[serde(default)]
    pub order: i32,
}

fn default_categories() -> Vec<String> {
    vec!["3000".to_string()]
}

fn default_true() -> bool {
    true
}

/// qBittorrent Web API connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadClientConfig {
    /// Web UI URL (e.g., "http://localhost:8080")
    pub url: String,
    pub username: String,
    pub password: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    /// Base URL the download client should use to reach indexer links,
    /// e.g. "http://jackett:9117" when the indexer is proxied.
    #[serde(default)]
    pub link_override: Option<String>,
    /// Delete data together with transfers rejected for their layout.
    #[serde(default = "default_true")]
    pub delete_files: bool,
}

fn default_timeout() -> u64 {
    30
}

/// Library placement settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
    /// Where the download client saves transfers.
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,
    #[serde(default)]
    pub file_mode: FileMode,
    /// Collision policy given to new tasks.
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    #[serde(default = "default_artist_pattern")]
    pub artist_pattern: String,
    #[serde(default = "default_album_pattern")]
    pub album_pattern: String,
    /// Subfolder for multi-disc albums.
    #[serde(default = "default_disc_pattern")]
    pub disc_pattern: String,
    #[serde(default = "default_track_pattern")]
    pub track_pattern: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            downloads_dir: default_downloads_dir(),
            file_mode: FileMode::default(),
            collision_policy: CollisionPolicy::default(),
            artist_pattern: default_artist_pattern(),
            album_pattern: default_album_pattern(),
            disc_pattern: default_disc_pattern(),
            track_pattern: default_track_pattern(),
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("/music")
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("/downloads")
}

fn default_artist_pattern() -> String {
    "{Artist}".to_string()
}

fn default_album_pattern() -> String {
    "{Year} - {Album}".to_string()
}

fn default_disc_pattern() -> String {
    "Disc {Disc}".to_string()
}

fn default_track_pattern() -> String {
    "{Track:2} - {Title}".to_string()
}

/// Defaults for pipeline runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_min_seeders")]
    pub min_seeders: u32,
    #[serde(default = "default_per_indexer_limit")]
    pub per_indexer_limit: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Timeout for one indexer request.
    #[serde(default = "default_timeout")]
    pub search_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_seeders: default_min_seeders(),
            per_indexer_limit: default_per_indexer_limit(),
            parallelism: default_parallelism(),
            auto_start: true,
            search_timeout_secs: default_timeout(),
        }
    }
}

fn default_limit() -> usize {
    50
}

fn default_min_seeders() -> u32 {
    1
}

fn default_per_indexer_limit() -> u32 {
    20
}

fn default_parallelism() -> usize {
    10
}

/// Background reconciliation loop.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Active tasks updated more recently than this are not refreshed.
    #[serde(default = "default_stale_secs")]
    pub stale_secs: i64,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            stale_secs: default_stale_secs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_stale_secs() -> i64 {
    60
}

fn default_batch_size() -> i64 {
    20
}

//! Download client abstraction.
//!
//! `DownloadClient` covers the handful of qBittorrent Web API calls the
//! pipeline needs. Around it sit transfer identifier resolution (magnet
//! parsing, `.torrent` hashing, name matching against the transfer list) and
//! the `TransferSubmitter` that binds a submitted transfer to its task.

pub mod bencode;
mod fetcher;
mod link;
mod magnet;
mod qbittorrent;
mod resolver;
mod submit;
mod types;

pub use bencode::{info_hash, BencodeError};
pub use fetcher::{HttpTorrentFetcher, TorrentFetcher};
pub use link::rewrite_link;
pub use magnet::parse_magnet_hash;
pub use qbittorrent::QBittorrentClient;
pub use resolver::{candidate_score, HashMethod, HashResolver, MatchHints, ResolverConfig};
pub use submit::{SubmitError, SubmitOptions, SubmitOutcome, TransferSubmitter, NO_HASH_ERROR};
pub use types::*;

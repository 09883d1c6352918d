//! Mock `.torrent` fetcher for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download_client::{DownloadClientError, TorrentFetcher};

/// Serves canned bodies by URL; anything else fails like an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct MockTorrentFetcher {
    responses: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl MockTorrentFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_response(&self, url: &str, body: Vec<u8>) {
        self.responses.write().await.insert(url.to_string(), body);
    }

    pub async fn requests(&self) -> Vec<String> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl TorrentFetcher for MockTorrentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadClientError> {
        self.requests.write().await.push(url.to_string());
        self.responses
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadClientError::FetchFailed(format!("no response for {}", url)))
    }
}

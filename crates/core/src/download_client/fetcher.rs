//! Downloading `.torrent` files to hash them locally.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::DownloadClientError;

/// Fetches the raw bytes behind a release link.
#[async_trait]
pub trait TorrentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadClientError>;
}

/// Plain HTTP fetcher.
pub struct HttpTorrentFetcher {
    client: Client,
}

impl HttpTorrentFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, DownloadClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                DownloadClientError::ApiError(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TorrentFetcher for HttpTorrentFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadClientError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadClientError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadClientError::FetchFailed(format!("HTTP {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadClientError::FetchFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

//! Torznab HTTP client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::indexer::Indexer;
use crate::metrics;

use super::feed::parse_feed;
use super::{FeedItem, FeedRequest, IndexerFeed, SearchError};

/// Talks to Torznab endpoints (Jackett, Prowlarr and friends).
pub struct TorznabClient {
    client: Client,
}

impl TorznabClient {
    pub fn new(timeout_secs: u64) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SearchError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// `<base>/api?t=search&apikey=..&q=..[&cat=..][&limit=..]`
    pub fn build_search_url(indexer: &Indexer, request: &FeedRequest) -> String {
        let mut url = format!(
            "{}/api?t=search&apikey={}&q={}",
            indexer.base_url.trim_end_matches('/'),
            urlencoding::encode(&indexer.api_key),
            urlencoding::encode(&request.query)
        );

        if !indexer.categories.is_empty() {
            url.push_str("&cat=");
            url.push_str(&urlencoding::encode(&indexer.categories.join(",")));
        }

        if let Some(limit) = request.limit.filter(|l| *l > 0) {
            url.push_str(&format!("&limit={}", limit));
        }

        url
    }
}

fn map_request_error(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Timeout
    } else if e.is_connect() {
        SearchError::ConnectionFailed(e.to_string())
    } else {
        SearchError::ApiError(e.to_string())
    }
}

#[async_trait]
impl IndexerFeed for TorznabClient {
    fn name(&self) -> &str {
        "torznab"
    }

    async fn fetch(
        &self,
        indexer: &Indexer,
        request: &FeedRequest,
    ) -> Result<Vec<FeedItem>, SearchError> {
        let url = Self::build_search_url(indexer, request);
        let start = Instant::now();

        debug!(indexer = %indexer.name, query = %request.query, "Searching indexer");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_request_error)?;

        metrics::INDEXER_REQUEST_DURATION
            .with_label_values(&[indexer.name.as_str()])
            .observe(start.elapsed().as_secs_f64());

        if !status.is_success() {
            warn!(
                indexer = %indexer.name,
                status = %status,
                preview = %body.chars().take(200).collect::<String>(),
                "Indexer returned HTTP error"
            );
            return Err(SearchError::HttpStatus(status.to_string()));
        }

        let items = parse_feed(&body);
        debug!(indexer = %indexer.name, results = items.len(), "Indexer search complete");

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexer(base_url: &str, categories: &[&str]) -> Indexer {
        Indexer {
            id: 1,
            name: "test".to_string(),
            base_url: base_url.to_string(),
            api_key: "se cret".to_string(),
            enabled: true,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            order: 0,
            error_count: 0,
            temp_disabled_until: None,
            last_error: None,
        }
    }

    #[test]
    fn test_build_search_url() {
        let url = TorznabClient::build_search_url(
            &indexer("http://jackett:9117/api/v2.0/indexers/all/results/torznab/", &["3000", "3040"]),
            &FeedRequest {
                query: "Pink Floyd - The Wall - 1979 FLAC".to_string(),
                limit: Some(20),
            },
        );
        assert_eq!(
            url,
            "http://jackett:9117/api/v2.0/indexers/all/results/torznab/api?t=search&apikey=se%20cret\
             &q=Pink%20Floyd%20-%20The%20Wall%20-%201979%20FLAC&cat=3000%2C3040&limit=20"
        );
    }

    #[test]
    fn test_build_search_url_without_optional_params() {
        let url = TorznabClient::build_search_url(
            &indexer("http://idx", &[]),
            &FeedRequest {
                query: "Кино".to_string(),
                limit: None,
            },
        );
        assert_eq!(
            url,
            "http://idx/api?t=search&apikey=se%20cret&q=%D0%9A%D0%B8%D0%BD%D0%BE"
        );
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        let client = TorznabClient::new(2).unwrap();
        let result = client
            .fetch(
                &indexer("http://127.0.0.1:1", &[]),
                &FeedRequest {
                    query: "x".to_string(),
                    limit: None,
                },
            )
            .await;
        let err = result.unwrap_err();
        assert!(err.is_retryable() || matches!(err, SearchError::ApiError(_)));
    }
}

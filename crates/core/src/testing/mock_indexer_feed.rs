//! Mock Torznab feed for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::indexer::Indexer;
use crate::searcher::{FeedItem, FeedRequest, IndexerFeed, SearchError};

#[derive(Debug, Clone)]
enum Scripted {
    Items(Vec<FeedItem>),
    HttpStatus(String),
    Error(String),
}

/// Answers per indexer name. Indexers without a scripted answer return no
/// items.
#[derive(Debug, Clone, Default)]
pub struct MockIndexerFeed {
    answers: Arc<RwLock<HashMap<String, Scripted>>>,
    requests: Arc<RwLock<Vec<(String, FeedRequest)>>>,
}

impl MockIndexerFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_results(&self, indexer: &str, items: Vec<FeedItem>) {
        self.answers
            .write()
            .await
            .insert(indexer.to_string(), Scripted::Items(items));
    }

    /// Answer with a non-success HTTP status.
    pub async fn set_http_status(&self, indexer: &str, status: &str) {
        self.answers
            .write()
            .await
            .insert(indexer.to_string(), Scripted::HttpStatus(status.to_string()));
    }

    /// Fail at the connection level.
    pub async fn set_error(&self, indexer: &str, message: &str) {
        self.answers
            .write()
            .await
            .insert(indexer.to_string(), Scripted::Error(message.to_string()));
    }

    /// `(indexer name, request)` in call order.
    pub async fn requests(&self) -> Vec<(String, FeedRequest)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl IndexerFeed for MockIndexerFeed {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(
        &self,
        indexer: &Indexer,
        request: &FeedRequest,
    ) -> Result<Vec<FeedItem>, SearchError> {
        self.requests
            .write()
            .await
            .push((indexer.name.clone(), request.clone()));

        match self.answers.read().await.get(&indexer.name) {
            Some(Scripted::Items(items)) => Ok(items.clone()),
            Some(Scripted::HttpStatus(status)) => Err(SearchError::HttpStatus(status.clone())),
            Some(Scripted::Error(message)) => Err(SearchError::ConnectionFailed(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

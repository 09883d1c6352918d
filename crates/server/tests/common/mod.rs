//! Common test utilities for API testing with mocks.
//!
//! The fixture builds the router over in-memory SQLite stores, a mock
//! Torznab feed, a mock download client and an in-memory wanted catalog.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use harvest_core::{
    clock::ManualClock,
    download_client::{HashResolver, ResolverConfig, SubmitOptions},
    indexer::HealthThresholds,
    placer::CollisionPolicy,
    task::BackoffPolicy,
    testing::{MemoryCatalog, MockDownloadClient, MockIndexerFeed, MockTorrentFetcher},
    AcquisitionPipeline, HealthTracker, IndexerStore, ReleaseSelector, RunOptions,
    SearchService, SqliteIndexerStore, SqliteTaskStore, TransferSubmitter,
};
use harvest_server::{create_router, AppState, PipelineRuns};

/// Re-export fixtures for test convenience
pub use harvest_core::testing::fixtures;

/// In-process server with controllable mocks.
pub struct TestFixture {
    pub router: Router,
    pub tasks: Arc<SqliteTaskStore>,
    pub indexers: Arc<SqliteIndexerStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub feed: Arc<MockIndexerFeed>,
    pub client: Arc<MockDownloadClient>,
    pub clock: Arc<ManualClock>,
    pub runs: Arc<PipelineRuns>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture with a single enabled indexer named "rutracker".
    pub fn new() -> Self {
        Self::with_indexers(&["rutracker"])
    }

    pub fn with_indexers(names: &[&str]) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap(),
        ));
        let tasks = Arc::new(
            SqliteTaskStore::in_memory()
                .expect("Failed to create task store")
                .with_clock(clock.clone()),
        );
        let indexers =
            Arc::new(SqliteIndexerStore::in_memory().expect("Failed to create indexer store"));
        for (order, name) in names.iter().enumerate() {
            indexers
                .upsert_config(&fixtures::indexer_config(name, order as i32))
                .expect("Failed to seed indexer");
        }
        let catalog = Arc::new(MemoryCatalog::new());
        let feed = Arc::new(MockIndexerFeed::new());
        let client = Arc::new(MockDownloadClient::new());

        let health = Arc::new(HealthTracker::new(
            indexers.clone(),
            clock.clone(),
            HealthThresholds::default(),
        ));
        let search = Arc::new(SearchService::new(
            tasks.clone(),
            tasks.clone(),
            health.clone(),
            feed.clone(),
            clock.clone(),
            BackoffPolicy::default(),
        ));
        let selector = Arc::new(ReleaseSelector::new(tasks.clone(), tasks.clone(), clock.clone()));
        let submitter = Arc::new(TransferSubmitter::new(
            tasks.clone(),
            client.clone(),
            HashResolver::new(
                Arc::new(MockTorrentFetcher::new()),
                ResolverConfig {
                    attempts: 1,
                    delay_ms: 0,
                    ..Default::default()
                },
            ),
            clock.clone(),
            BackoffPolicy::default(),
            SubmitOptions::default(),
        ));
        let pipeline = Arc::new(AcquisitionPipeline::new(
            tasks.clone(),
            catalog.clone(),
            health.clone(),
            search,
            selector,
            submitter,
            clock.clone(),
            CollisionPolicy::Replace,
        ));
        let runs = Arc::new(PipelineRuns::new(pipeline, RunOptions::default()));

        let state = Arc::new(AppState::new(
            tasks.clone(),
            tasks.clone(),
            health,
            runs.clone(),
            None,
        ));

        Self {
            router: create_router(state),
            tasks,
            indexers,
            catalog,
            feed,
            client,
            clock,
            runs,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// GET returning the raw body text (for non-JSON endpoints).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll the status endpoint until the background run finishes.
    pub async fn wait_for_run(&self) -> TestResponse {
        for _ in 0..200 {
            if !self.runs.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.get("/api/v1/pipeline/status").await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}

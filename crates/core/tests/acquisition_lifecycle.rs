//! Acquisition lifecycle integration tests.
//!
//! These tests drive a wanted album through the whole pipeline with mock
//! indexers, a mock download client and a temporary library:
//! wanted -> queued -> searching -> found -> added -> downloading ->
//! downloaded -> moving -> moved

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use harvest_core::{
    catalog::{SqliteWantedCatalog, WantedCatalog, WantedRecord},
    clock::ManualClock,
    config::PollerConfig,
    cue::CueSplitter,
    download_client::{
        HashResolver, ResolverConfig, SubmitOptions, TransferFile, TransferState,
        TransferSubmitter,
    },
    importer::{ImportSettings, LibraryImporter},
    indexer::{HealthThresholds, HealthTracker, IndexerStore, SqliteIndexerStore},
    layout::Layout,
    orchestrator::{AcquisitionPipeline, CancelFlag, RunOptions},
    placer::{CollisionPolicy, FileMode, NamingPatterns},
    poller::Poller,
    searcher::SearchService,
    selector::ReleaseSelector,
    task::{AlbumProgress, BackoffPolicy, ReleaseStatus, ReleaseStore, SqliteTaskStore, TaskStatus, TaskStore},
    testing::{fixtures, MockCutter, MockDownloadClient, MockIndexerFeed, MockTorrentFetcher},
};

const HASH: &str = "C12FE1C06BBA254A9DC9F519B335AA7C1367A88A";

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
}

/// Test helper wiring every component against in-memory stores.
struct TestHarness {
    clock: Arc<ManualClock>,
    tasks: Arc<SqliteTaskStore>,
    indexers: Arc<SqliteIndexerStore>,
    catalog: Arc<SqliteWantedCatalog>,
    feed: Arc<MockIndexerFeed>,
    client: Arc<MockDownloadClient>,
    pipeline: AcquisitionPipeline,
    poller: Arc<Poller>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new(indexer_names: &[&str]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let clock = Arc::new(ManualClock::new(start()));
        let tasks = Arc::new(
            SqliteTaskStore::in_memory()
                .expect("Failed to create task store")
                .with_clock(clock.clone()),
        );
        let indexers =
            Arc::new(SqliteIndexerStore::in_memory().expect("Failed to create indexer store"));
        for (order, name) in indexer_names.iter().enumerate() {
            indexers
                .upsert_config(&fixtures::indexer_config(name, order as i32))
                .expect("Failed to seed indexer");
        }
        let catalog =
            Arc::new(SqliteWantedCatalog::in_memory().expect("Failed to create catalog"));
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
        let pipeline = AcquisitionPipeline::new(
            tasks.clone(),
            catalog.clone(),
            health,
            search,
            selector,
            submitter,
            clock.clone(),
            CollisionPolicy::Replace,
        );

        let importer = Arc::new(LibraryImporter::new(
            tasks.clone(),
            client.clone(),
            CueSplitter::new(Arc::new(MockCutter::new())),
            clock.clone(),
            BackoffPolicy::default(),
            ImportSettings {
                library_root: temp_dir.path().join("library"),
                downloads_dir: temp_dir.path().join("downloads"),
                patterns: NamingPatterns::default(),
                mode: FileMode::Copy,
            },
        ));
        let poller = Arc::new(Poller::new(
            tasks.clone(),
            tasks.clone(),
            client.clone(),
            importer,
            clock.clone(),
            BackoffPolicy::default(),
            PollerConfig::default(),
        ));

        Self {
            clock,
            tasks,
            indexers,
            catalog,
            feed,
            client,
            pipeline,
            poller,
            temp_dir,
        }
    }

    fn downloads(&self) -> PathBuf {
        self.temp_dir.path().join("downloads")
    }

    fn library(&self) -> PathBuf {
        self.temp_dir.path().join("library")
    }

    fn want_the_wall(&self) {
        self.catalog
            .upsert(&WantedRecord::album(
                "rec-1",
                "Pink Floyd",
                "The Wall",
                Some(1979),
                start(),
            ))
            .expect("Failed to insert wanted record");
    }

    async fn write_download(&self, names: &[&str]) -> Vec<TransferFile> {
        for name in names {
            let path = self.downloads().join(name);
            tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            tokio::fs::write(&path, b"audio").await.unwrap();
        }
        names.iter().map(|n| TransferFile::new(*n, 5)).collect()
    }

    async fn report_transfer(&self, state: TransferState, progress: f64, files: Vec<TransferFile>) {
        let mut info = fixtures::transfer(HASH, "Pink Floyd - The Wall", path_str(&self.downloads()));
        info.state = state;
        info.progress = progress;
        self.client.add_transfer(info, files).await;
    }

    fn only_task(&self) -> harvest_core::task::Task {
        let tasks = self
            .tasks
            .list(&harvest_core::task::TaskFilter::new())
            .expect("Failed to list tasks");
        assert_eq!(tasks.len(), 1, "expected exactly one task");
        tasks.into_iter().next().unwrap()
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

#[tokio::test]
async fn test_wanted_album_reaches_library() {
    let h = TestHarness::new(&["rutracker"]);
    h.want_the_wall();
    h.feed
        .set_results(
            "rutracker",
            vec![
                fixtures::feed_item("Pink Floyd - The Wall (1979) [FLAC]", HASH, 42),
                fixtures::feed_item(
                    "Pink Floyd - The Wall (1979) [MP3]",
                    "1111111111111111111111111111111111111111",
                    3,
                ),
            ],
        )
        .await;

    // Pipeline run: search, select, submit.
    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default(), &CancelFlag::new())
        .await
        .expect("run failed");
    assert_eq!(report.stats.tasks_created, 1);
    assert_eq!(report.stats.searches_ok, 1);
    assert_eq!(report.stats.added, 1);
    assert_eq!(report.stats.errors, 0);
    assert!(report.halted.is_none());

    let task = h.only_task();
    assert_eq!(task.status, TaskStatus::Added);
    assert_eq!(task.transfer_hash.as_deref(), Some(HASH));
    assert_eq!(
        h.catalog.get("rec-1").unwrap().unwrap().progress,
        AlbumProgress::Downloading
    );
    let added = h.client.added_requests().await;
    assert_eq!(added.len(), 1);
    assert!(!added[0].paused);

    // Poller: metadata arrives, layout is classified.
    let files = h
        .write_download(&[
            "Pink Floyd - The Wall/01 - In the Flesh.flac",
            "Pink Floyd - The Wall/02 - The Thin Ice.flac",
            "Pink Floyd - The Wall/cover.jpg",
        ])
        .await;
    h.report_transfer(TransferState::Downloading, 0.1, files.clone())
        .await;
    let tick = h.poller.tick().await;
    assert_eq!(tick.classified, 1);
    let task = h.only_task();
    assert_eq!(task.status, TaskStatus::Downloading);
    assert_eq!(task.layout, Some(Layout::SimpleAlbum));

    // Download finishes; the refresh picks it up once stale.
    h.report_transfer(TransferState::Seeding, 1.0, files).await;
    h.clock.advance(Duration::seconds(61));
    let tick = h.poller.tick().await;
    assert_eq!(tick.refreshed, 1);
    assert_eq!(tick.imported, 1);

    let task = h.only_task();
    assert_eq!(task.status, TaskStatus::Moved);
    let album = h.library().join("Pink Floyd").join("1979 - The Wall");
    assert_eq!(task.final_path.as_deref(), Some(path_str(&album)));
    assert!(album.join("01 - In the Flesh.flac").exists());
    assert!(album.join("02 - The Thin Ice.flac").exists());
    assert!(album.join("cover.jpg").exists());

    let releases = h.tasks.list_for_task(&task.id).unwrap();
    let winner = releases
        .iter()
        .find(|r| r.info_hash.as_deref() == Some(HASH))
        .unwrap();
    assert_eq!(winner.status, ReleaseStatus::Downloaded);

    // Next run only settles the catalog progress.
    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.stats.tasks_reused, 1);
    assert_eq!(report.stats.skipped_existing, 1);
    assert_eq!(h.client.added_requests().await.len(), 1);
    assert_eq!(
        h.catalog.get("rec-1").unwrap().unwrap().progress,
        AlbumProgress::Downloaded
    );
    assert!(h.catalog.list_unresolved(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let h = TestHarness::new(&["rutracker"]);
    h.want_the_wall();

    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default().with_dry_run(true), &CancelFlag::new())
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.plan.len(), 1);
    assert_eq!(report.plan[0].query, "Pink Floyd - The Wall - 1979 FLAC");
    assert!(!report.plan[0].would_skip);
    assert!(h
        .tasks
        .list(&harvest_core::task::TaskFilter::new())
        .unwrap()
        .is_empty());
    assert!(h.feed.requests().await.is_empty());
}

#[tokio::test]
async fn test_run_halts_without_indexers() {
    let h = TestHarness::new(&[]);
    h.want_the_wall();

    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();

    assert!(report.halted.is_some());
    assert_eq!(report.stats.tasks_created, 0);
    assert!(h.client.added_requests().await.is_empty());
}

#[tokio::test]
async fn test_failing_indexers_halt_the_run() {
    let h = TestHarness::new(&["rutracker"]);
    h.want_the_wall();
    h.catalog
        .upsert(&WantedRecord::album("rec-2", "Kino", "Gruppa Krovi", Some(1988), start()))
        .unwrap();
    h.feed.set_http_status("rutracker", "502 Bad Gateway").await;

    let options = RunOptions {
        parallelism: 1,
        ..Default::default()
    };
    let report = h
        .pipeline
        .run_unmatched(&options, &CancelFlag::new())
        .await
        .unwrap();

    assert!(report.halted.is_some());
    // The first batch failed; the second never ran.
    assert_eq!(report.stats.tasks_created, 1);
    assert_eq!(h.feed.requests().await.len(), 1);
    let indexer = &h.indexers.list_all().unwrap()[0];
    assert_eq!(indexer.error_count, 1);
}

#[tokio::test]
async fn test_no_candidates_requeues_task() {
    let h = TestHarness::new(&["rutracker"]);
    h.want_the_wall();
    // Only an unseeded hit.
    h.feed
        .set_results(
            "rutracker",
            vec![fixtures::feed_item("Pink Floyd - The Wall [FLAC]", HASH, 0)],
        )
        .await;

    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.stats.no_candidates, 1);

    let task = h.only_task();
    assert_eq!(task.status, TaskStatus::Queued);
    assert_eq!(task.last_error.as_deref(), Some("No suitable releases"));
    assert_eq!(task.scheduled_at, Some(start() + Duration::minutes(30)));

    // Still waiting: the next run leaves it alone.
    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    assert_eq!(report.stats.skipped_existing, 1);
    assert_eq!(h.feed.requests().await.len(), 1);
}

#[tokio::test]
async fn test_cancelled_run_does_nothing() {
    let h = TestHarness::new(&["rutracker"]);
    h.want_the_wall();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let report = h
        .pipeline
        .run_unmatched(&RunOptions::default(), &cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.stats.tasks_created, 0);
}

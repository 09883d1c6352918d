use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use harvest_core::{
    cue::{CueSplitter, FfmpegCutter},
    download_client::{HashResolver, HttpTorrentFetcher, SubmitOptions},
    load_config, validate_config, AcquisitionPipeline, HealthTracker, ImportSettings,
    IndexerStore, LibraryImporter, Poller, QBittorrentClient, ReleaseSelector, RunOptions,
    SearchService, SqliteIndexerStore, SqliteTaskStore, SqliteWantedCatalog, SystemClock,
    TorznabClient, TransferSubmitter,
};
use harvest_server::{create_router, AppState, PipelineRuns};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("HARVEST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    let clock = Arc::new(SystemClock);

    // Stores share one SQLite file
    let tasks = Arc::new(
        SqliteTaskStore::new(&config.database.path).context("Failed to open task store")?,
    );
    let indexers = Arc::new(
        SqliteIndexerStore::new(&config.database.path).context("Failed to open indexer store")?,
    );
    let catalog = Arc::new(
        SqliteWantedCatalog::new(&config.database.path)
            .context("Failed to open wanted catalog")?,
    );

    for indexer in &config.indexers {
        indexers
            .upsert_config(indexer)
            .with_context(|| format!("Failed to seed indexer {}", indexer.name))?;
    }
    info!("Seeded {} indexers", config.indexers.len());

    // External seams
    info!("Initializing qBittorrent client at {}", config.download_client.url);
    let client = Arc::new(
        QBittorrentClient::new(config.download_client.clone())
            .context("Failed to create download client")?,
    );
    let feed = Arc::new(
        TorznabClient::new(config.pipeline.search_timeout_secs)
            .context("Failed to create Torznab client")?,
    );
    let fetcher = Arc::new(
        HttpTorrentFetcher::new(config.download_client.timeout_secs)
            .context("Failed to create torrent fetcher")?,
    );
    let cutter = Arc::new(FfmpegCutter::new(config.cutter.clone()));

    // Acquisition
    let health = Arc::new(HealthTracker::new(
        indexers.clone(),
        clock.clone(),
        config.health,
    ));
    let search = Arc::new(SearchService::new(
        tasks.clone(),
        tasks.clone(),
        health.clone(),
        feed,
        clock.clone(),
        config.backoff,
    ));
    let selector = Arc::new(ReleaseSelector::new(tasks.clone(), tasks.clone(), clock.clone()));
    let save_path = Some(config.library.downloads_dir.to_string_lossy().into_owned());
    let submitter = Arc::new(TransferSubmitter::new(
        tasks.clone(),
        client.clone(),
        HashResolver::new(fetcher, config.resolver),
        clock.clone(),
        config.backoff,
        SubmitOptions::from_config(&config.download_client, save_path),
    ));
    let pipeline = Arc::new(AcquisitionPipeline::new(
        tasks.clone(),
        catalog,
        health.clone(),
        search,
        selector,
        submitter,
        clock.clone(),
        config.library.collision_policy,
    ));
    let runs = Arc::new(PipelineRuns::new(
        pipeline,
        RunOptions::from_config(&config.pipeline),
    ));

    // Download tracking and import
    let importer = Arc::new(LibraryImporter::new(
        tasks.clone(),
        client.clone(),
        CueSplitter::new(cutter),
        clock.clone(),
        config.backoff,
        ImportSettings::from_library(&config.library),
    ));
    let poller = Arc::new(
        Poller::new(
            tasks.clone(),
            tasks.clone(),
            client,
            importer,
            clock,
            config.backoff,
            config.poller.clone(),
        )
        .with_delete_files(config.download_client.delete_files),
    );

    if config.poller.enabled {
        poller.start();
        info!("Poller started");
    } else {
        warn!("Poller disabled in config");
    }

    let state = Arc::new(AppState::new(
        tasks.clone(),
        tasks,
        health,
        runs.clone(),
        Some(poller.clone()),
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    poller.stop();
    if runs.cancel() {
        info!("Cancelled pipeline run in progress");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

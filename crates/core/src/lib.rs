pub mod catalog;
pub mod clock;
pub mod config;
pub mod cue;
pub mod download_client;
pub mod importer;
pub mod indexer;
pub mod layout;
pub mod matching;
pub mod metrics;
pub mod orchestrator;
pub mod placer;
pub mod poller;
pub mod searcher;
pub mod selector;
pub mod task;
pub mod testing;

pub use catalog::{CatalogError, SqliteWantedCatalog, WantedCatalog, WantedRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use download_client::{DownloadClient, QBittorrentClient, TransferSubmitter};
pub use importer::{ImportError, ImportOutcome, ImportSettings, LibraryImporter};
pub use indexer::{HealthTracker, IndexerStore, SqliteIndexerStore};
pub use layout::{classify, Layout};
pub use orchestrator::{AcquisitionPipeline, CancelFlag, PipelineError, RunOptions, RunReport};
pub use poller::{Poller, PollerError, TickReport};
pub use searcher::{SearchService, TorznabClient};
pub use selector::{ReleaseSelector, Selection};
pub use task::{SqliteTaskStore, Task, TaskError, TaskStatus, TaskStore};

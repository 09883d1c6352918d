//! HTTP surface of the harvest acquisition pipeline.

pub mod api;
pub mod metrics;
pub mod runs;
pub mod state;

pub use api::create_router;
pub use runs::{PipelineRuns, RunRequest, RunStatus};
pub use state::AppState;

use std::sync::Arc;

use harvest_core::task::ReleaseStore;
use harvest_core::{HealthTracker, Poller, TaskStore};

use crate::runs::PipelineRuns;

/// Shared application state
pub struct AppState {
    tasks: Arc<dyn TaskStore>,
    releases: Arc<dyn ReleaseStore>,
    health: Arc<HealthTracker>,
    runs: Arc<PipelineRuns>,
    poller: Option<Arc<Poller>>,
}

impl AppState {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        releases: Arc<dyn ReleaseStore>,
        health: Arc<HealthTracker>,
        runs: Arc<PipelineRuns>,
        poller: Option<Arc<Poller>>,
    ) -> Self {
        Self {
            tasks,
            releases,
            health,
            runs,
            poller,
        }
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn releases(&self) -> &Arc<dyn ReleaseStore> {
        &self.releases
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn runs(&self) -> &Arc<PipelineRuns> {
        &self.runs
    }

    /// Poller, if one was built.
    pub fn poller(&self) -> Option<&Arc<Poller>> {
        self.poller.as_ref()
    }
}

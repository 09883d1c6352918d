//! Mock audio cutter for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cue::{AudioCutter, CutRequest, CutterError};

/// Records cut requests and writes an empty output file for each, unless a
/// failure is scripted.
#[derive(Debug, Clone, Default)]
pub struct MockCutter {
    requests: Arc<RwLock<Vec<CutRequest>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl MockCutter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failure(&self, reason: Option<&str>) {
        *self.failure.write().await = reason.map(str::to_string);
    }

    pub async fn requests(&self) -> Vec<CutRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl AudioCutter for MockCutter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn cut(&self, request: &CutRequest) -> Result<(), CutterError> {
        self.requests.write().await.push(request.clone());

        if let Some(reason) = self.failure.read().await.clone() {
            return Err(CutterError::Failed { reason });
        }

        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output, b"").await?;
        Ok(())
    }
}

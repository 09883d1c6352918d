//! Mock download client for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::download_client::{
    AddTransferRequest, DownloadClient, DownloadClientError, TransferFile, TransferInfo,
};

#[derive(Debug, Clone)]
struct MockTransfer {
    info: TransferInfo,
    files: Vec<TransferFile>,
}

#[derive(Debug, Default)]
struct MockState {
    /// Keyed by upper-case hash.
    transfers: HashMap<String, MockTransfer>,
    /// Insertion order of hashes, so `list` is stable.
    order: Vec<String>,
    added: Vec<AddTransferRequest>,
    relocations: Vec<(String, String)>,
    deleted: Vec<(String, bool)>,
    resumed: Vec<String>,
    list_calls: usize,
    unreachable: bool,
    add_error: Option<String>,
    delete_error: Option<String>,
    appear_on_add: Option<TransferInfo>,
}

/// In-memory stand-in for qBittorrent.
///
/// Transfers are registered with [`MockDownloadClient::add_transfer`]; every
/// mutating call is recorded for assertions. `set_unreachable` makes every
/// call fail with a connection error.
#[derive(Debug, Clone, Default)]
pub struct MockDownloadClient {
    state: Arc<RwLock<MockState>>,
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a transfer and its file manifest.
    pub async fn add_transfer(&self, info: TransferInfo, files: Vec<TransferFile>) {
        let mut state = self.state.write().await;
        let key = info.hash.to_uppercase();
        if !state.transfers.contains_key(&key) {
            state.order.push(key.clone());
        }
        state.transfers.insert(key, MockTransfer { info, files });
    }

    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// Make `add` fail with an API error.
    pub async fn set_add_error(&self, error: Option<&str>) {
        self.state.write().await.add_error = error.map(str::to_string);
    }

    /// Make `delete` fail with an API error.
    pub async fn set_delete_error(&self, error: Option<&str>) {
        self.state.write().await.delete_error = error.map(str::to_string);
    }

    /// Whether a transfer with this hash is still registered.
    pub async fn has_transfer(&self, hash: &str) -> bool {
        self.state
            .read()
            .await
            .transfers
            .contains_key(&hash.to_uppercase())
    }

    /// Transfer that shows up in the list after the next successful `add`.
    pub async fn set_appear_on_add(&self, info: Option<TransferInfo>) {
        self.state.write().await.appear_on_add = info;
    }

    pub async fn added_requests(&self) -> Vec<AddTransferRequest> {
        self.state.read().await.added.clone()
    }

    /// `(hash, location)` pairs passed to `set_location`.
    pub async fn relocations(&self) -> Vec<(String, String)> {
        self.state.read().await.relocations.clone()
    }

    /// `(hash, delete_files)` pairs passed to `delete`.
    pub async fn deleted(&self) -> Vec<(String, bool)> {
        self.state.read().await.deleted.clone()
    }

    pub async fn resumed(&self) -> Vec<String> {
        self.state.read().await.resumed.clone()
    }

    pub async fn list_calls(&self) -> usize {
        self.state.read().await.list_calls
    }

    fn check_reachable(state: &MockState) -> Result<(), DownloadClientError> {
        if state.unreachable {
            Err(DownloadClientError::ConnectionFailed(
                "mock client unreachable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add(&self, request: AddTransferRequest) -> Result<(), DownloadClientError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;
        if let Some(error) = state.add_error.clone() {
            return Err(DownloadClientError::ApiError(error));
        }
        state.added.push(request);
        if let Some(info) = state.appear_on_add.take() {
            let key = info.hash.to_uppercase();
            state.order.push(key.clone());
            state.transfers.insert(
                key,
                MockTransfer {
                    info,
                    files: Vec::new(),
                },
            );
        }
        Ok(())
    }

    async fn list(&self, category: Option<&str>) -> Result<Vec<TransferInfo>, DownloadClientError> {
        let mut state = self.state.write().await;
        state.list_calls += 1;
        Self::check_reachable(&state)?;
        Ok(state
            .order
            .iter()
            .filter_map(|key| state.transfers.get(key))
            .map(|t| t.info.clone())
            .filter(|info| category.is_none() || info.category.as_deref() == category)
            .collect())
    }

    async fn info(&self, hash: &str) -> Result<Option<TransferInfo>, DownloadClientError> {
        let state = self.state.read().await;
        Self::check_reachable(&state)?;
        Ok(state
            .transfers
            .get(&hash.to_uppercase())
            .map(|t| t.info.clone()))
    }

    async fn files(&self, hash: &str) -> Result<Vec<TransferFile>, DownloadClientError> {
        let state = self.state.read().await;
        Self::check_reachable(&state)?;
        state
            .transfers
            .get(&hash.to_uppercase())
            .map(|t| t.files.clone())
            .ok_or_else(|| DownloadClientError::NotFound(hash.to_string()))
    }

    async fn set_location(&self, hash: &str, location: &str) -> Result<(), DownloadClientError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;
        let transfer = state
            .transfers
            .get_mut(&hash.to_uppercase())
            .ok_or_else(|| DownloadClientError::NotFound(hash.to_string()))?;
        transfer.info.save_path = Some(location.to_string());
        state
            .relocations
            .push((hash.to_string(), location.to_string()));
        Ok(())
    }

    async fn delete(&self, hash: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;
        if let Some(error) = state.delete_error.clone() {
            return Err(DownloadClientError::ApiError(error));
        }
        let key = hash.to_uppercase();
        state.transfers.remove(&key);
        state.order.retain(|k| k != &key);
        state.deleted.push((hash.to_string(), delete_files));
        Ok(())
    }

    async fn resume(&self, hash: &str) -> Result<(), DownloadClientError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&state)?;
        if !state.transfers.contains_key(&hash.to_uppercase()) {
            return Err(DownloadClientError::NotFound(hash.to_string()));
        }
        state.resumed.push(hash.to_string());
        Ok(())
    }
}

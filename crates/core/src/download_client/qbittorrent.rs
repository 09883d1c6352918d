//! qBittorrent Web API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{multipart, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::DownloadClientConfig;

use super::{
    AddTransferRequest, DownloadClient, DownloadClientError, TransferFile, TransferInfo,
    TransferSource, TransferState,
};

/// qBittorrent client.
///
/// The session cookie lives in the HTTP client's cookie jar. It is obtained on
/// first use and again whenever the Web API answers 403.
pub struct QBittorrentClient {
    client: Client,
    config: DownloadClientConfig,
    authenticated: RwLock<bool>,
}

impl QBittorrentClient {
    pub fn new(config: DownloadClientConfig) -> Result<Self, DownloadClientError> {
        if config.url.trim().is_empty() {
            return Err(DownloadClientError::ApiError(
                "download client url is not set".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .map_err(|e| {
                DownloadClientError::ApiError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            config,
            authenticated: RwLock::new(false),
        })
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url(), endpoint)
    }

    async fn login(&self) -> Result<(), DownloadClientError> {
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(self.url("/api/v2/auth/login"))
            .form(&params)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() && body.contains("Ok.") {
            info!(base = %self.base_url(), "qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status == StatusCode::FORBIDDEN {
            Err(DownloadClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(DownloadClientError::AuthenticationFailed(format!(
                "Unexpected response: {} {}",
                status,
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), DownloadClientError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Send an authenticated request, logging in again once on 403.
    async fn send<F>(&self, build: F) -> Result<String, DownloadClientError>
    where
        F: Fn() -> Result<RequestBuilder, DownloadClientError>,
    {
        self.ensure_authenticated().await?;

        let mut response = build()?.send().await.map_err(map_request_error)?;

        if response.status() == StatusCode::FORBIDDEN {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            response = build()?.send().await.map_err(map_request_error)?;
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DownloadClientError::NotFound(status.to_string()));
        }
        if !status.is_success() {
            return Err(DownloadClientError::ApiError(format!("HTTP {}", status)));
        }

        response.text().await.map_err(map_request_error)
    }

    async fn get(&self, endpoint: &str) -> Result<String, DownloadClientError> {
        let url = self.url(endpoint);
        self.send(|| Ok(self.client.get(&url))).await
    }

    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, DownloadClientError> {
        let url = self.url(endpoint);
        debug!(endpoint = %endpoint, "qBittorrent POST");
        self.send(|| Ok(self.client.post(&url).form(params))).await
    }

    fn add_form(&self, request: &AddTransferRequest) -> multipart::Form {
        let mut form = multipart::Form::new().text("urls", request.source.as_str().to_string());

        if let Some(path) = &request.save_path {
            form = form.text("savepath", path.clone());
        }
        if let Some(category) = &request.category {
            form = form.text("category", category.clone());
        }
        if let Some(tags) = &request.tags {
            form = form.text("tags", tags.clone());
        }
        if request.paused {
            // `paused` for 4.x, `stopped` for 5.x.
            form = form.text("paused", "true").text("stopped", "true");
        }
        form
    }
}

fn map_request_error(e: reqwest::Error) -> DownloadClientError {
    if e.is_timeout() {
        DownloadClientError::Timeout
    } else if e.is_connect() {
        DownloadClientError::ConnectionFailed(e.to_string())
    } else {
        DownloadClientError::ApiError(e.to_string())
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, DownloadClientError> {
    serde_json::from_str(body)
        .map_err(|e| DownloadClientError::ApiError(format!("Failed to parse response: {}", e)))
}

/// `torrents/info` entry.
#[derive(Debug, Deserialize)]
struct QBTorrentInfo {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    added_on: i64,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    content_path: String,
    #[serde(default)]
    category: String,
}

impl QBTorrentInfo {
    fn into_transfer_info(self) -> TransferInfo {
        TransferInfo {
            hash: self.hash.to_uppercase(),
            name: self.name,
            state: parse_qb_state(&self.state),
            progress: self.progress,
            size_bytes: self.size.max(0) as u64,
            save_path: non_empty(self.save_path),
            content_path: non_empty(self.content_path),
            added_at: timestamp_to_datetime(self.added_on),
            category: non_empty(self.category),
        }
    }
}

/// `torrents/files` entry.
#[derive(Debug, Deserialize)]
struct QBFile {
    name: String,
    #[serde(default)]
    size: i64,
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_qb_state(state: &str) -> TransferState {
    match state {
        "downloading" | "forcedDL" | "allocating" => TransferState::Downloading,
        "metaDL" | "forcedMetaDL" => TransferState::Metadata,
        "uploading" | "forcedUP" => TransferState::Seeding,
        "pausedDL" | "pausedUP" | "stoppedDL" | "stoppedUP" => TransferState::Paused,
        "checkingDL" | "checkingUP" | "checkingResumeData" => TransferState::Checking,
        "queuedDL" | "queuedUP" => TransferState::Queued,
        "stalledDL" | "stalledUP" => TransferState::Stalled,
        "error" => TransferState::Error,
        "missingFiles" => TransferState::MissingFiles,
        _ => TransferState::Unknown,
    }
}

fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    if ts > 0 {
        Utc.timestamp_opt(ts, 0).single()
    } else {
        None
    }
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add(&self, request: AddTransferRequest) -> Result<(), DownloadClientError> {
        let url = self.url("/api/v2/torrents/add");
        let body = self
            .send(|| Ok(self.client.post(&url).multipart(self.add_form(&request))))
            .await?;

        if body.contains("Fails.") {
            return Err(DownloadClientError::ApiError(
                "qBittorrent rejected the transfer".to_string(),
            ));
        }

        let kind = match request.source {
            TransferSource::Magnet(_) => "magnet",
            TransferSource::Url(_) => "url",
        };
        info!(
            kind,
            save_path = ?request.save_path,
            category = ?request.category,
            paused = request.paused,
            "Transfer added to qBittorrent"
        );
        Ok(())
    }

    async fn list(&self, category: Option<&str>) -> Result<Vec<TransferInfo>, DownloadClientError> {
        let mut endpoint = "/api/v2/torrents/info?filter=all".to_string();
        if let Some(category) = category {
            endpoint.push_str(&format!("&category={}", urlencoding::encode(category)));
        }

        let torrents: Vec<QBTorrentInfo> = parse_json(&self.get(&endpoint).await?)?;
        Ok(torrents
            .into_iter()
            .map(QBTorrentInfo::into_transfer_info)
            .collect())
    }

    async fn info(&self, hash: &str) -> Result<Option<TransferInfo>, DownloadClientError> {
        let endpoint = format!("/api/v2/torrents/info?hashes={}", hash.to_lowercase());
        let torrents: Vec<QBTorrentInfo> = parse_json(&self.get(&endpoint).await?)?;
        Ok(torrents
            .into_iter()
            .next()
            .map(QBTorrentInfo::into_transfer_info))
    }

    async fn files(&self, hash: &str) -> Result<Vec<TransferFile>, DownloadClientError> {
        let endpoint = format!("/api/v2/torrents/files?hash={}", hash.to_lowercase());
        let files: Vec<QBFile> = parse_json(&self.get(&endpoint).await?)?;
        Ok(files
            .into_iter()
            .map(|f| TransferFile::new(f.name, f.size.max(0) as u64))
            .collect())
    }

    async fn set_location(&self, hash: &str, location: &str) -> Result<(), DownloadClientError> {
        let hash = hash.to_lowercase();
        self.post_form(
            "/api/v2/torrents/setLocation",
            &[("hashes", &hash), ("location", location)],
        )
        .await?;
        info!(hash = %hash, location = %location, "Transfer relocation requested");
        Ok(())
    }

    async fn delete(&self, hash: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        let hash = hash.to_lowercase();
        let delete_str = if delete_files { "true" } else { "false" };
        self.post_form(
            "/api/v2/torrents/delete",
            &[("hashes", &hash), ("deleteFiles", delete_str)],
        )
        .await?;
        info!(hash = %hash, delete_files, "Transfer deleted");
        Ok(())
    }

    async fn resume(&self, hash: &str) -> Result<(), DownloadClientError> {
        let hash = hash.to_lowercase();
        match self
            .post_form("/api/v2/torrents/resume", &[("hashes", &hash)])
            .await
        {
            // 5.x renamed resume to start.
            Err(DownloadClientError::NotFound(_)) => {
                self.post_form("/api/v2/torrents/start", &[("hashes", &hash)])
                    .await?;
            }
            other => {
                other?;
            }
        }
        Ok(())
    }
}

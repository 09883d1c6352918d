//! Core task and release data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::layout::Layout;
use crate::placer::CollisionPolicy;

/// Error returned when a stored or wire value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// What a task is trying to acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Artist,
    #[default]
    Album,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Artist => "artist",
            Scope::Album => "album",
        }
    }
}

impl FromStr for Scope {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artist" => Ok(Scope::Artist),
            "album" => Ok(Scope::Album),
            other => Err(UnknownVariant::new("scope", other)),
        }
    }
}

/// Who created a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Manual,
    #[default]
    Auto,
    Catalog,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Manual => "manual",
            TaskSource::Auto => "auto",
            TaskSource::Catalog => "catalog",
        }
    }
}

impl FromStr for TaskSource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TaskSource::Manual),
            "auto" => Ok(TaskSource::Auto),
            "catalog" => Ok(TaskSource::Catalog),
            other => Err(UnknownVariant::new("source", other)),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Searching,
    Found,
    Added,
    Downloading,
    Downloaded,
    Moving,
    Moved,
    Invalid,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 10] = [
        TaskStatus::Queued,
        TaskStatus::Searching,
        TaskStatus::Found,
        TaskStatus::Added,
        TaskStatus::Downloading,
        TaskStatus::Downloaded,
        TaskStatus::Moving,
        TaskStatus::Moved,
        TaskStatus::Invalid,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Searching => "searching",
            TaskStatus::Found => "found",
            TaskStatus::Added => "added",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Downloaded => "downloaded",
            TaskStatus::Moving => "moving",
            TaskStatus::Moved => "moved",
            TaskStatus::Invalid => "invalid",
            TaskStatus::Failed => "failed",
        }
    }

    /// Whether a task may move from `self` to `next`.
    ///
    /// Re-entering the current status is always allowed (it is a field patch).
    /// `moved` is final. Every other status may short-circuit to `failed` or
    /// `invalid`. `failed` and `invalid` can only be re-queued or searched again.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if self == next {
            return true;
        }

        match (self, next) {
            (Moved, _) => false,
            (_, Failed) | (_, Invalid) => true,

            (Queued, Searching) | (Queued, Added) => true,
            (Searching, Found) | (Searching, Queued) => true,
            (Found, Searching) | (Found, Queued) | (Found, Added) => true,

            // Reconciled from the download client once a hash is known.
            (Queued | Searching | Found, Downloading | Downloaded) => true,

            (Added, Downloading) | (Added, Downloaded) | (Added, Queued) => true,
            (Downloading, Added) | (Downloading, Queued) | (Downloading, Downloaded) => true,
            (Downloaded, Moving) | (Downloaded, Moved) => true,
            (Moving, Moved) => true,

            (Failed, Queued) | (Failed, Searching) | (Failed, Added) => true,
            (Invalid, Queued) => true,

            _ => false,
        }
    }

    /// Statuses that the pipeline never restarts on its own.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TaskStatus::Added
                | TaskStatus::Downloading
                | TaskStatus::Downloaded
                | TaskStatus::Moving
                | TaskStatus::Moved
                | TaskStatus::Invalid
        )
    }

    /// Coarse progress tag surfaced to the wanted catalog.
    pub fn album_progress(&self) -> AlbumProgress {
        match self {
            TaskStatus::Queued | TaskStatus::Searching => AlbumProgress::Searching,
            TaskStatus::Found => AlbumProgress::Found,
            TaskStatus::Added | TaskStatus::Downloading => AlbumProgress::Downloading,
            TaskStatus::Downloaded | TaskStatus::Moving | TaskStatus::Moved => {
                AlbumProgress::Downloaded
            }
            TaskStatus::Invalid | TaskStatus::Failed => AlbumProgress::None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("task status", s))
    }
}

/// Progress tag written back to a wanted album record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlbumProgress {
    #[default]
    None,
    Searching,
    Found,
    Downloading,
    Downloaded,
}

impl AlbumProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlbumProgress::None => "none",
            AlbumProgress::Searching => "searching",
            AlbumProgress::Found => "found",
            AlbumProgress::Downloading => "downloading",
            AlbumProgress::Downloaded => "downloaded",
        }
    }
}

impl FromStr for AlbumProgress {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AlbumProgress::None),
            "searching" => Ok(AlbumProgress::Searching),
            "found" => Ok(AlbumProgress::Found),
            "downloading" => Ok(AlbumProgress::Downloading),
            "downloaded" => Ok(AlbumProgress::Downloaded),
            other => Err(UnknownVariant::new("album progress", other)),
        }
    }
}

/// Status of a candidate release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    New,
    Chosen,
    Queued,
    Downloading,
    Downloaded,
    Rejected,
    Failed,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::New => "new",
            ReleaseStatus::Chosen => "chosen",
            ReleaseStatus::Queued => "queued",
            ReleaseStatus::Downloading => "downloading",
            ReleaseStatus::Downloaded => "downloaded",
            ReleaseStatus::Rejected => "rejected",
            ReleaseStatus::Failed => "failed",
        }
    }
}

impl FromStr for ReleaseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ReleaseStatus::New),
            "chosen" => Ok(ReleaseStatus::Chosen),
            "queued" => Ok(ReleaseStatus::Queued),
            "downloading" => Ok(ReleaseStatus::Downloading),
            "downloaded" => Ok(ReleaseStatus::Downloaded),
            "rejected" => Ok(ReleaseStatus::Rejected),
            "failed" => Ok(ReleaseStatus::Failed),
            other => Err(UnknownVariant::new("release status", other)),
        }
    }
}

/// One acquisition attempt for one artist or album.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub dedup_key: String,

    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_artist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_album_id: Option<String>,
    pub source: TaskSource,

    pub collision_policy: CollisionPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_seeders: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_releases_per_indexer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_indexer_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,

    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tried_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Human readable label used in logs and fallback folder names.
    pub fn title(&self) -> String {
        match (&self.artist, &self.album) {
            (Some(artist), Some(album)) => format!("{} - {}", artist, album),
            (Some(artist), None) => artist.clone(),
            (None, Some(album)) => album.clone(),
            (None, None) => self.query.clone().unwrap_or_else(|| self.id.clone()),
        }
    }

    /// Whether the task is waiting for a scheduled retry at `now`.
    pub fn is_scheduled_after(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_some_and(|at| at > now)
    }
}

/// One candidate transfer offered by one indexer for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub id: String,
    /// Insertion order, used as the tie-breaker when scores are equal.
    pub seq: i64,
    pub task_id: String,
    pub indexer_id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leechers: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub status: ReleaseStatus,
    pub created_at: DateTime<Utc>,
}

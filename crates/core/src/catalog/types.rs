//! Types for the wanted catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{AlbumProgress, Scope};

/// An artist or album someone wants in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WantedRecord {
    pub id: String,
    pub scope: Scope,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Artist identifier in the metadata catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_artist_id: Option<String>,
    /// Album identifier in the metadata catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_album_id: Option<String>,
    #[serde(default)]
    pub progress: AlbumProgress,
    pub created_at: DateTime<Utc>,
}

impl WantedRecord {
    pub fn album(
        id: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
        year: Option<i32>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            scope: Scope::Album,
            artist: artist.into(),
            album: Some(album.into()),
            year,
            ext_artist_id: None,
            ext_album_id: None,
            progress: AlbumProgress::None,
            created_at,
        }
    }

    pub fn artist(
        id: impl Into<String>,
        artist: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            scope: Scope::Artist,
            artist: artist.into(),
            album: None,
            year: None,
            ext_artist_id: None,
            ext_album_id: None,
            progress: AlbumProgress::None,
            created_at,
        }
    }

    pub fn with_external_ids(mut self, artist_id: Option<String>, album_id: Option<String>) -> Self {
        self.ext_artist_id = artist_id;
        self.ext_album_id = album_id;
        self
    }

    /// Still needs acquiring.
    pub fn is_unresolved(&self) -> bool {
        self.progress != AlbumProgress::Downloaded
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Wanted record not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),
}

//! Error types for the placer module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during file placement.
#[derive(Debug, Error)]
pub enum PlacerError {
    /// Source file not found.
    #[error("Source not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Destination exists and the collision policy is `ask`.
    #[error("Destination exists: {path}")]
    DestinationExists { path: PathBuf },

    /// Naming template could not be parsed.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Failed to create destination directory.
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy file.
    #[error("Failed to copy file from {source} to {destination}")]
    CopyFailed {
        source: PathBuf,
        destination: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlacerError {
    pub fn copy_failed(source: PathBuf, destination: PathBuf, error: std::io::Error) -> Self {
        Self::CopyFailed {
            source,
            destination,
            error,
        }
    }

    pub fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::CopyFailed { .. })
    }
}

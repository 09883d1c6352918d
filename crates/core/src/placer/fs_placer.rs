//! Filesystem placement with collision policies and link/move fallbacks.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use super::error::PlacerError;
use super::types::{CollisionPolicy, FileMode, PlaceOutcome};
use crate::metrics::FILES_PLACED;

/// Apply the collision policy to an existing destination.
///
/// Returns `Skipped` when the caller must leave the destination alone and
/// `Placed` when it may write. `replace` removes the existing file first.
pub async fn resolve_collision(
    destination: &Path,
    policy: CollisionPolicy,
) -> Result<PlaceOutcome, PlacerError> {
    if !path_exists(destination).await {
        return Ok(PlaceOutcome::Placed);
    }

    match policy {
        CollisionPolicy::Skip => Ok(PlaceOutcome::Skipped),
        CollisionPolicy::Ask => Err(PlacerError::DestinationExists {
            path: destination.to_path_buf(),
        }),
        CollisionPolicy::Replace => {
            fs::remove_file(destination).await?;
            Ok(PlaceOutcome::Placed)
        }
        CollisionPolicy::Merge => Ok(PlaceOutcome::Placed),
    }
}

/// Place one file at `destination`, creating parent directories.
pub async fn place_file(
    source: &Path,
    destination: &Path,
    mode: FileMode,
    policy: CollisionPolicy,
) -> Result<PlaceOutcome, PlacerError> {
    if !path_exists(source).await {
        return Err(PlacerError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PlacerError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    if resolve_collision(destination, policy).await? == PlaceOutcome::Skipped {
        debug!(destination = %destination.display(), "Destination exists, skipping");
        FILES_PLACED.with_label_values(&[PlaceOutcome::Skipped.as_str()]).inc();
        return Ok(PlaceOutcome::Skipped);
    }

    match mode {
        FileMode::Copy => copy_file(source, destination).await?,
        FileMode::Hardlink => {
            if path_exists(destination).await {
                fs::remove_file(destination).await?;
            }
            if let Err(e) = fs::hard_link(source, destination).await {
                debug!(error = %e, "Hard link failed, copying instead");
                copy_file(source, destination).await?;
            }
        }
        FileMode::Move => {
            if let Err(e) = fs::rename(source, destination).await {
                debug!(error = %e, "Rename failed, copying then deleting source");
                copy_file(source, destination).await?;
                if let Err(e) = fs::remove_file(source).await {
                    warn!(source = %source.display(), error = %e, "Failed to remove source after copy");
                }
            }
        }
    }

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        mode = mode.as_str(),
        "Placed file"
    );
    FILES_PLACED.with_label_values(&[PlaceOutcome::Placed.as_str()]).inc();
    Ok(PlaceOutcome::Placed)
}

/// Remove a source directory after a move-mode import. Failures are logged.
pub async fn remove_source_dir(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove source directory");
    }
}

pub async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn copy_file(source: &Path, destination: &Path) -> Result<(), PlacerError> {
    fs::copy(source, destination)
        .await
        .map(|_| ())
        .map_err(|e| PlacerError::copy_failed(source.to_path_buf(), destination.to_path_buf(), e))
}

//! Types for the placer module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::task::UnknownVariant;

/// What to do when a placement destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Refuse and surface the conflict to the caller.
    Ask,
    /// Delete the existing destination, then place.
    #[default]
    Replace,
    /// Leave the existing destination untouched.
    Skip,
    /// Place over the existing path without clearing anything else.
    Merge,
}

impl CollisionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionPolicy::Ask => "ask",
            CollisionPolicy::Replace => "replace",
            CollisionPolicy::Skip => "skip",
            CollisionPolicy::Merge => "merge",
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollisionPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask" => Ok(CollisionPolicy::Ask),
            "replace" => Ok(CollisionPolicy::Replace),
            "skip" => Ok(CollisionPolicy::Skip),
            "merge" => Ok(CollisionPolicy::Merge),
            other => Err(UnknownVariant::new("collision policy", other)),
        }
    }
}

/// How a file reaches the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileMode {
    #[default]
    Copy,
    /// Hard link, falling back to a copy across filesystems.
    Hardlink,
    /// Rename, falling back to copy then delete.
    Move,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Copy => "copy",
            FileMode::Hardlink => "hardlink",
            FileMode::Move => "move",
        }
    }
}

/// Result of placing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed,
    /// Destination existed and the policy was `skip`.
    Skipped,
}

impl PlaceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceOutcome::Placed => "placed",
            PlaceOutcome::Skipped => "skipped",
        }
    }
}

/// Counts for a batch of placements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementReport {
    pub placed: usize,
    pub skipped: usize,
}

impl PlacementReport {
    pub fn record(&mut self, outcome: PlaceOutcome) {
        match outcome {
            PlaceOutcome::Placed => self.placed += 1,
            PlaceOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Naming templates for library paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingPatterns {
    pub artist: String,
    pub album: String,
    pub disc: String,
    pub track: String,
}

impl Default for NamingPatterns {
    fn default() -> Self {
        Self {
            artist: "{Artist}".to_string(),
            album: "{Year} - {Album}".to_string(),
            disc: "Disc {Disc}".to_string(),
            track: "{Track:2} - {Title}".to_string(),
        }
    }
}

impl NamingPatterns {
    pub fn from_library(library: &crate::config::LibraryConfig) -> Self {
        Self {
            artist: library.artist_pattern.clone(),
            album: library.album_pattern.clone(),
            disc: library.disc_pattern.clone(),
            track: library.track_pattern.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("merge".parse::<CollisionPolicy>().unwrap(), CollisionPolicy::Merge);
        assert!("overwrite".parse::<CollisionPolicy>().is_err());
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::Replace);
    }

    #[test]
    fn test_file_mode_serde() {
        let mode: FileMode = serde_json::from_str("\"hardlink\"").unwrap();
        assert_eq!(mode, FileMode::Hardlink);
        assert_eq!(serde_json::to_string(&FileMode::Move).unwrap(), "\"move\"");
    }

    #[test]
    fn test_report_record() {
        let mut report = PlacementReport::default();
        report.record(PlaceOutcome::Placed);
        report.record(PlaceOutcome::Placed);
        report.record(PlaceOutcome::Skipped);
        assert_eq!(report, PlacementReport { placed: 2, skipped: 1 });
    }
}

//! Copying an album's files into the library under rendered names.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::info;

use super::error::PlacerError;
use super::fs_placer::place_file;
use super::pattern::{apply_pattern, first_non_empty, sanitize_name, PatternValues};
use super::types::{CollisionPolicy, FileMode, NamingPatterns, PlacementReport};
use crate::layout::{extension, is_audio_file, path_parts};

static DISC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^a-z0-9а-я])(?:cd|disc|disk|диск)\s*0*(\d{1,2})(?:$|[^0-9])").unwrap()
});
static TRACK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3})[.\-\s_]+(.+)$").unwrap());

const COVER_STEMS: &[&str] = &["cover", "folder", "front"];

/// Disc and track numbers guessed from a relative path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackGuess {
    pub disc: Option<u32>,
    pub track: Option<u32>,
    pub title: String,
}

/// Guess `disc` from the directory segments (`CD1`, `Disc 02 (Bonus)`,
/// `Диск 1`) and `track`/`title` from a leading number in the file stem.
pub fn guess_track_meta(relative: &str) -> TrackGuess {
    let parts = path_parts(relative);
    let Some((file, dirs)) = parts.split_last() else {
        return TrackGuess::default();
    };

    let disc = dirs.iter().find_map(|dir| {
        let normalized = dir
            .to_lowercase()
            .replace(['.', '_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        DISC_RE
            .captures(&normalized)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .filter(|n| (1..100).contains(n))
    });

    let stem = stem(file);
    match TRACK_RE.captures(stem) {
        Some(caps) => TrackGuess {
            disc,
            track: caps[1].parse().ok(),
            title: caps[2].trim().to_string(),
        },
        None => TrackGuess {
            disc,
            track: None,
            title: stem.trim().to_string(),
        },
    }
}

/// `cover.jpg`, `Folder.png`, `FRONT.jpeg`.
pub fn is_cover_image(name: &str) -> bool {
    let file = path_parts(name).last().copied().unwrap_or_default();
    COVER_STEMS.contains(&stem(file).to_lowercase().as_str())
}

fn stem(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

/// Library-relative path for one source file, or `None` when the file is
/// not audio or cover art.
pub fn target_name(relative: &str, patterns: &NamingPatterns) -> Option<PathBuf> {
    let ext = extension(relative).unwrap_or_default();

    if is_audio_file(relative) {
        let guess = guess_track_meta(relative);
        let file = path_parts(relative).last().copied().unwrap_or_default();
        let file_name = match guess.track {
            Some(track) => {
                let values = PatternValues {
                    track: Some(track),
                    title: first_non_empty([Some(guess.title.as_str()), Some(stem(file))]),
                    disc: guess.disc,
                    ..Default::default()
                };
                format!("{}.{}", apply_pattern(&patterns.track, &values), ext)
            }
            None => {
                let name = sanitize_name(stem(file));
                format!("{}.{}", name, ext)
            }
        };

        return Some(match guess.disc {
            Some(disc) => {
                let values = PatternValues {
                    disc: Some(disc),
                    ..Default::default()
                };
                PathBuf::from(apply_pattern(&patterns.disc, &values)).join(file_name)
            }
            None => PathBuf::from(file_name),
        });
    }

    if is_cover_image(relative) {
        return Some(PathBuf::from(format!("cover.{}", ext)));
    }

    None
}

/// Place the audio files and cover art of one album under `album_dir`.
///
/// `files` are paths relative to `source_base`. Other files are ignored.
pub async fn copy_with_renaming(
    files: &[String],
    source_base: &Path,
    album_dir: &Path,
    patterns: &NamingPatterns,
    mode: FileMode,
    policy: CollisionPolicy,
) -> Result<PlacementReport, PlacerError> {
    let mut report = PlacementReport::default();

    for relative in files {
        let Some(target) = target_name(relative, patterns) else {
            continue;
        };

        let source = path_parts(relative)
            .into_iter()
            .fold(source_base.to_path_buf(), |acc, part| acc.join(part));
        let destination = album_dir.join(target);

        let outcome = place_file(&source, &destination, mode, policy).await?;
        report.record(outcome);
    }

    info!(
        album_dir = %album_dir.display(),
        placed = report.placed,
        skipped = report.skipped,
        "Copied album files"
    );
    Ok(report)
}

//! Splitting a single-file CUE image into tagged tracks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::cutter::{AudioCutter, CutCodec, CutRequest, TrackTags};
use super::decode::decode_cue;
use super::sheet::{parse_cue, CueSheet};
use super::CueError;
use crate::layout::{extension, is_audio_file, is_cue_file, path_parts};
use crate::metrics::{FILES_PLACED, TRACKS_SPLIT};
use crate::placer::{
    apply_pattern, first_non_empty, remove_source_dir, resolve_collision, CollisionPolicy,
    FileMode, NamingPatterns, PatternValues, PlaceOutcome, PlacementReport,
};

/// Album metadata known from the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumMeta {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

impl AlbumMeta {
    /// Field-wise merge: catalog values first, the cue sheet only fills gaps.
    pub fn merged_with(&self, sheet: &CueSheet) -> AlbumMeta {
        AlbumMeta {
            artist: self.artist.clone().or_else(|| sheet.performer.clone()),
            album: self.album.clone().or_else(|| sheet.title.clone()),
            year: self.year.or_else(|| sheet.year()),
            genre: self.genre.clone().or_else(|| sheet.genre.clone()),
        }
    }
}

/// Inputs for one split.
#[derive(Debug, Clone)]
pub struct SplitJob<'a> {
    /// Directory the manifest paths are relative to.
    pub source_base: &'a Path,
    pub files: &'a [String],
    pub album_dir: &'a Path,
    pub patterns: &'a NamingPatterns,
    pub policy: CollisionPolicy,
    pub mode: FileMode,
    pub meta: &'a AlbumMeta,
}

pub struct CueSplitter {
    cutter: Arc<dyn AudioCutter>,
}

impl CueSplitter {
    pub fn new(cutter: Arc<dyn AudioCutter>) -> Self {
        Self { cutter }
    }

    pub async fn split(&self, job: SplitJob<'_>) -> Result<PlacementReport, CueError> {
        let audio: Vec<&String> = job.files.iter().filter(|f| is_audio_file(f)).collect();
        let cue = job.files.iter().find(|f| is_cue_file(f));
        let (audio, cue) = match (audio.as_slice(), cue) {
            ([audio], Some(cue)) => (*audio, cue),
            _ => {
                return Err(CueError::LayoutMismatch {
                    audio: audio.len(),
                })
            }
        };

        let cue_path = resolve(job.source_base, cue);
        let bytes = tokio::fs::read(&cue_path)
            .await
            .map_err(|e| CueError::Read {
                path: cue_path.clone(),
                source: e,
            })?;
        let decoded = decode_cue(&bytes);
        debug!(path = %cue_path.display(), encoding = decoded.encoding, "Decoded cue sheet");

        let sheet = parse_cue(&decoded.text);
        if sheet.tracks.is_empty() {
            return Err(CueError::NoTracks { path: cue_path });
        }

        let meta = job.meta.merged_with(&sheet);
        let input = resolve(job.source_base, audio);
        let source_ext = extension(audio).unwrap_or_else(|| "flac".to_string());
        let codec = CutCodec::for_extension(&source_ext);
        let output_ext = codec.output_extension(&source_ext);
        let total = sheet.tracks.len() as u32;

        tokio::fs::create_dir_all(job.album_dir).await?;

        let mut report = PlacementReport::default();
        for (i, track) in sheet.tracks.iter().enumerate() {
            let start = track.start.as_seconds();
            let duration = sheet
                .tracks
                .get(i + 1)
                .map(|next| (next.start.as_seconds() - start).max(0.0));

            let fallback = format!("Track {}", track.number);
            let values = PatternValues {
                track: Some(track.number),
                title: first_non_empty([Some(track.title.as_str()), Some(fallback.as_str())]),
                ..Default::default()
            };
            let output = job
                .album_dir
                .join(format!("{}.{}", apply_pattern(&job.patterns.track, &values), output_ext));

            if resolve_collision(&output, job.policy).await? == PlaceOutcome::Skipped {
                debug!(output = %output.display(), "Track exists, skipping");
                FILES_PLACED.with_label_values(&[PlaceOutcome::Skipped.as_str()]).inc();
                report.record(PlaceOutcome::Skipped);
                continue;
            }

            let request = CutRequest {
                input: input.clone(),
                output,
                start_secs: start,
                duration_secs: duration,
                codec,
                tags: TrackTags {
                    track_number: track.number,
                    track_total: total,
                    title: track.title.clone(),
                    album: meta.album.clone(),
                    artist: track.performer.clone().or_else(|| meta.artist.clone()),
                    album_artist: meta.artist.clone(),
                    year: meta.year,
                    genre: meta.genre.clone(),
                },
            };

            debug!(
                track = track.number,
                start,
                duration = ?duration,
                output = %request.output.display(),
                "Cutting track"
            );
            self.cutter.cut(&request).await?;

            TRACKS_SPLIT.inc();
            FILES_PLACED.with_label_values(&[PlaceOutcome::Placed.as_str()]).inc();
            report.record(PlaceOutcome::Placed);
        }

        if job.mode == FileMode::Move {
            remove_source_dir(job.source_base).await;
        }

        info!(
            cutter = self.cutter.name(),
            album_dir = %job.album_dir.display(),
            tracks = total,
            placed = report.placed,
            skipped = report.skipped,
            "Split cue image"
        );
        Ok(report)
    }
}

fn resolve(base: &Path, relative: &str) -> PathBuf {
    path_parts(relative)
        .into_iter()
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCutter;
    use tempfile::TempDir;
    use tokio::fs;

    const CUE: &str = "PERFORMER \"Cue Artist\"\nTITLE \"Cue Album\"\nREM DATE 1990\nREM GENRE Jazz\n\
FILE \"image.ape\" WAVE\n\
  TRACK 01 AUDIO\n    TITLE \"First\"\n    INDEX 01 00:00:00\n\
  TRACK 02 AUDIO\n    TITLE \"Second\"\n    PERFORMER \"Guest\"\n    INDEX 01 03:00:00\n\
  TRACK 03 AUDIO\n    TITLE \"Third\"\n    INDEX 01 07:30:00\n";

    async fn fixture() -> (TempDir, PathBuf, Vec<String>) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("downloads/Album");
        fs::create_dir_all(&source).await.unwrap();
        fs::write(source.join("image.ape"), b"audio").await.unwrap();
        fs::write(source.join("image.cue"), CUE).await.unwrap();
        let files = vec!["image.ape".to_string(), "image.cue".to_string(), "log.txt".to_string()];
        (temp, source, files)
    }

    fn job<'a>(
        source: &'a Path,
        files: &'a [String],
        album_dir: &'a Path,
        patterns: &'a NamingPatterns,
        meta: &'a AlbumMeta,
        policy: CollisionPolicy,
        mode: FileMode,
    ) -> SplitJob<'a> {
        SplitJob {
            source_base: source,
            files,
            album_dir,
            patterns,
            policy,
            mode,
            meta,
        }
    }

    #[test]
    fn test_catalog_metadata_wins() {
        let sheet = parse_cue(CUE);
        let catalog = AlbumMeta {
            artist: Some("Catalog Artist".to_string()),
            album: None,
            year: Some(1991),
            genre: None,
        };
        let merged = catalog.merged_with(&sheet);
        assert_eq!(merged.artist.as_deref(), Some("Catalog Artist"));
        assert_eq!(merged.album.as_deref(), Some("Cue Album"));
        assert_eq!(merged.year, Some(1991));
        assert_eq!(merged.genre.as_deref(), Some("Jazz"));
    }

    #[tokio::test]
    async fn test_split_cuts_every_track() {
        let (temp, source, files) = fixture().await;
        let album_dir = temp.path().join("music/Artist/Album");
        let cutter = Arc::new(MockCutter::new());
        let splitter = CueSplitter::new(cutter.clone());
        let patterns = NamingPatterns::default();
        let meta = AlbumMeta {
            artist: Some("Catalog Artist".to_string()),
            ..Default::default()
        };

        let report = splitter
            .split(job(&source, &files, &album_dir, &patterns, &meta, CollisionPolicy::Replace, FileMode::Copy))
            .await
            .unwrap();

        assert_eq!(report.placed, 3);
        let requests = cutter.requests().await;
        assert_eq!(requests.len(), 3);

        assert_eq!(requests[0].output, album_dir.join("01 - First.flac"));
        assert_eq!(requests[0].codec, CutCodec::Flac);
        assert_eq!(requests[0].start_secs, 0.0);
        assert_eq!(requests[0].duration_secs, Some(180.0));
        assert_eq!(requests[0].tags.artist.as_deref(), Some("Catalog Artist"));
        assert_eq!(requests[0].tags.album.as_deref(), Some("Cue Album"));
        assert_eq!(requests[0].tags.year, Some(1990));
        assert_eq!(requests[0].tags.track_total, 3);

        assert_eq!(requests[1].tags.artist.as_deref(), Some("Guest"));
        assert_eq!(requests[1].duration_secs, Some(270.0));
        assert_eq!(requests[2].duration_secs, None);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_split_respects_skip_policy() {
        let (temp, source, files) = fixture().await;
        let album_dir = temp.path().join("music");
        fs::create_dir_all(&album_dir).await.unwrap();
        fs::write(album_dir.join("02 - Second.flac"), b"kept").await.unwrap();
        let cutter = Arc::new(MockCutter::new());
        let patterns = NamingPatterns::default();
        let meta = AlbumMeta::default();

        let report = CueSplitter::new(cutter.clone())
            .split(job(&source, &files, &album_dir, &patterns, &meta, CollisionPolicy::Skip, FileMode::Copy))
            .await
            .unwrap();

        assert_eq!(report, PlacementReport { placed: 2, skipped: 1 });
        assert_eq!(fs::read(album_dir.join("02 - Second.flac")).await.unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_split_ask_policy_raises() {
        let (temp, source, files) = fixture().await;
        let album_dir = temp.path().join("music");
        fs::create_dir_all(&album_dir).await.unwrap();
        fs::write(album_dir.join("01 - First.flac"), b"kept").await.unwrap();
        let patterns = NamingPatterns::default();
        let meta = AlbumMeta::default();

        let err = CueSplitter::new(Arc::new(MockCutter::new()))
            .split(job(&source, &files, &album_dir, &patterns, &meta, CollisionPolicy::Ask, FileMode::Copy))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Destination exists"));
    }

    #[tokio::test]
    async fn test_move_mode_removes_source() {
        let (temp, source, files) = fixture().await;
        let album_dir = temp.path().join("music");
        let patterns = NamingPatterns::default();
        let meta = AlbumMeta::default();

        CueSplitter::new(Arc::new(MockCutter::new()))
            .split(job(&source, &files, &album_dir, &patterns, &meta, CollisionPolicy::Replace, FileMode::Move))
            .await
            .unwrap();

        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_cutter_failure_propagates() {
        let (temp, source, files) = fixture().await;
        let album_dir = temp.path().join("music");
        let cutter = Arc::new(MockCutter::new());
        cutter.set_failure(Some("boom")).await;
        let patterns = NamingPatterns::default();
        let meta = AlbumMeta::default();

        let err = CueSplitter::new(cutter)
            .split(job(&source, &files, &album_dir, &patterns, &meta, CollisionPolicy::Replace, FileMode::Move))
            .await
            .unwrap_err();

        assert!(matches!(err, CueError::Cutter(_)));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_layout_mismatch() {
        let temp = TempDir::new().unwrap();
        let files = vec!["a.flac".to_string(), "b.flac".to_string(), "a.cue".to_string()];
        let patterns = NamingPatterns::default();
        let meta = AlbumMeta::default();

        let err = CueSplitter::new(Arc::new(MockCutter::new()))
            .split(job(temp.path(), &files, temp.path(), &patterns, &meta, CollisionPolicy::Replace, FileMode::Copy))
            .await
            .unwrap_err();
        assert!(matches!(err, CueError::LayoutMismatch { audio: 2 }));
    }
}

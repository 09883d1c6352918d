//! CUE sheet support: decoding, parsing, and cutting a single-file image
//! into tagged tracks.

mod cutter;
mod decode;
mod sheet;
mod split;

use std::path::PathBuf;

use thiserror::Error;

pub use cutter::{AudioCutter, CutCodec, CutRequest, CutterConfig, CutterError, FfmpegCutter, TrackTags};
pub use decode::{decode_cue, is_strict_utf8, score_text, DecodedText};
pub use sheet::{ffmpeg_timestamp, parse_cue, CueSheet, CueTime, CueTrack, FRAMES_PER_SECOND};
pub use split::{AlbumMeta, CueSplitter, SplitJob};

use crate::placer::PlacerError;

#[derive(Debug, Error)]
pub enum CueError {
    #[error("singleFileCue layout mismatch: expected 1 audio file and a cue sheet, found {audio} audio")]
    LayoutMismatch { audio: usize },

    #[error("Failed to read cue sheet {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CUE has no usable tracks: {path}")]
    NoTracks { path: PathBuf },

    #[error(transparent)]
    Cutter(#[from] CutterError),

    #[error(transparent)]
    Placer(#[from] PlacerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CueError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cutter(e) => e.is_retryable(),
            Self::Placer(e) => e.is_retryable(),
            Self::Io(_) => true,
            _ => false,
        }
    }
}

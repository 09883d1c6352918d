//! Cutting one track out of an audio image with an external tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::sheet::ffmpeg_timestamp;

/// Configuration for the ffmpeg cutter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Timeout for a single track in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// FFmpeg log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_timeout() -> u64 {
    600
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for CutterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_timeout(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CutterError {
    #[error("FFmpeg not found at path: {path}")]
    NotFound { path: PathBuf },

    #[error("Cut failed: {reason}")]
    Failed { reason: String },

    #[error("Cut timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CutterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}

/// Whether the cut re-encodes or copies the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutCodec {
    /// Decode and re-encode to FLAC so the output carries a correct duration.
    Flac,
    /// Stream copy in the source container.
    Copy,
}

impl CutCodec {
    /// Lossless sources are re-encoded; everything else is copied.
    pub fn for_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "flac" | "fla" | "wav" | "ape" | "wv" | "aiff" | "alac" => CutCodec::Flac,
            _ => CutCodec::Copy,
        }
    }

    /// Extension of the produced file.
    pub fn output_extension(&self, source_ext: &str) -> String {
        match self {
            CutCodec::Flac => "flac".to_string(),
            CutCodec::Copy => source_ext.to_ascii_lowercase(),
        }
    }
}

/// Tags written into each cut track.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackTags {
    pub track_number: u32,
    pub track_total: u32,
    pub title: String,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

impl TrackTags {
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut pairs = vec![
            format!("track={}/{}", self.track_number, self.track_total),
            format!("title={}", self.title),
        ];
        if let Some(ref album) = self.album {
            pairs.push(format!("album={}", album));
        }
        if let Some(ref artist) = self.artist {
            pairs.push(format!("artist={}", artist));
        }
        if let Some(ref album_artist) = self.album_artist {
            pairs.push(format!("album_artist={}", album_artist));
        }
        if let Some(year) = self.year {
            pairs.push(format!("date={}", year));
        }
        if let Some(ref genre) = self.genre {
            pairs.push(format!("genre={}", genre));
        }

        pairs
            .into_iter()
            .flat_map(|pair| ["-metadata".to_string(), pair])
            .collect()
    }
}

/// One track to cut.
#[derive(Debug, Clone, PartialEq)]
pub struct CutRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start_secs: f64,
    /// `None` runs to the end of the input.
    pub duration_secs: Option<f64>,
    pub codec: CutCodec,
    pub tags: TrackTags,
}

#[async_trait]
pub trait AudioCutter: Send + Sync {
    fn name(&self) -> &str;

    async fn cut(&self, request: &CutRequest) -> Result<(), CutterError>;
}

pub struct FfmpegCutter {
    config: CutterConfig,
}

impl FfmpegCutter {
    pub fn new(config: CutterConfig) -> Self {
        Self { config }
    }

    /// Stream copies seek on the input (fast); re-encodes seek after opening
    /// the input (sample accurate).
    pub fn build_args(&self, request: &CutRequest) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ];

        let seek = ["-ss".to_string(), ffmpeg_timestamp(request.start_secs)];
        let input = ["-i".to_string(), path_arg(&request.input)];
        match request.codec {
            CutCodec::Copy => {
                args.extend(seek);
                args.extend(input);
            }
            CutCodec::Flac => {
                args.extend(input);
                args.extend(seek);
            }
        }

        if let Some(duration) = request.duration_secs.filter(|d| *d > 0.1) {
            args.extend(["-t".to_string(), ffmpeg_timestamp(duration)]);
        }

        let codec = match request.codec {
            CutCodec::Flac => "flac",
            CutCodec::Copy => "copy",
        };
        args.extend(["-acodec".to_string(), codec.to_string()]);
        args.extend(request.tags.to_ffmpeg_args());
        args.extend(["-vn".to_string(), "-y".to_string(), path_arg(&request.output)]);
        args
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[async_trait]
impl AudioCutter for FfmpegCutter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn cut(&self, request: &CutRequest) -> Result<(), CutterError> {
        let args = self.build_args(request);
        debug!(args = ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CutterError::NotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    CutterError::Io(e)
                }
            })?;

        let mut stderr = child.stderr.take();
        let result = timeout(Duration::from_secs(self.config.timeout_secs), async {
            let mut output = String::new();
            if let Some(ref mut pipe) = stderr {
                pipe.read_to_string(&mut output).await?;
            }
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, output))
        })
        .await;

        match result {
            Ok(Ok((status, _))) if status.success() => Ok(()),
            Ok(Ok((status, output))) => {
                let output = output.trim();
                Err(CutterError::Failed {
                    reason: if output.is_empty() {
                        format!("ffmpeg exited with code {:?}", status.code())
                    } else {
                        output.to_string()
                    },
                })
            }
            Ok(Err(e)) => Err(CutterError::Io(e)),
            Err(_) => Err(CutterError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }),
        }
    }
}

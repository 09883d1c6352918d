//! Cue sheet parsing.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Frames per second of CD audio timestamps.
pub const FRAMES_PER_SECOND: u32 = 75;

static REM_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)^REM\s+DATE\s+"?([^"]+)"?"#).unwrap());
static GENRE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^(?:REM\s+)?GENRE\s+"?([^"]+)"?"#).unwrap());
static TRACK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^TRACK\s+(\d{1,2})\b").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)^TITLE\s+"([^"]+)""#).unwrap());
static PERFORMER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^PERFORMER\s+"([^"]+)""#).unwrap());
static INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^INDEX\s+01\s+(\d{1,3}):(\d{2}):(\d{2})").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{4})").unwrap());

/// Start of a track as `MM:SS:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CueTime {
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl CueTime {
    pub fn as_seconds(&self) -> f64 {
        (self.minutes * 60 + self.seconds) as f64 + self.frames as f64 / FRAMES_PER_SECOND as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CueTrack {
    pub number: u32,
    pub title: String,
    pub performer: Option<String>,
    pub start: CueTime,
}

/// Album-level directives and complete tracks, sorted by number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CueSheet {
    pub title: Option<String>,
    pub performer: Option<String>,
    pub genre: Option<String>,
    pub date: Option<String>,
    pub tracks: Vec<CueTrack>,
}

impl CueSheet {
    /// First four-digit run of `REM DATE`.
    pub fn year(&self) -> Option<i32> {
        let date = self.date.as_deref()?;
        YEAR_RE.captures(date)?[1].parse().ok()
    }
}

#[derive(Default)]
struct PendingTrack {
    number: u32,
    title: Option<String>,
    performer: Option<String>,
    start: Option<CueTime>,
}

impl PendingTrack {
    fn finish(self) -> Option<CueTrack> {
        Some(CueTrack {
            number: self.number,
            title: self.title.filter(|t| !t.is_empty())?,
            performer: self.performer,
            start: self.start?,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parse decoded cue sheet text. Tracks missing a title or an `INDEX 01` are
/// dropped.
pub fn parse_cue(text: &str) -> CueSheet {
    let mut sheet = CueSheet::default();
    let mut current: Option<PendingTrack> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(caps) = REM_DATE_RE.captures(line) {
            sheet.date = non_empty(&caps[1]);
        } else if let Some(caps) = GENRE_RE.captures(line) {
            sheet.genre = non_empty(&caps[1]);
        } else if let Some(caps) = TRACK_RE.captures(line) {
            if let Some(track) = current.take().and_then(PendingTrack::finish) {
                sheet.tracks.push(track);
            }
            current = caps[1].parse().ok().map(|number| PendingTrack {
                number,
                ..Default::default()
            });
        } else if let Some(caps) = TITLE_RE.captures(line) {
            match current.as_mut() {
                Some(track) => track.title = non_empty(&caps[1]),
                None => sheet.title = non_empty(&caps[1]),
            }
        } else if let Some(caps) = PERFORMER_RE.captures(line) {
            match current.as_mut() {
                Some(track) => track.performer = non_empty(&caps[1]),
                None => sheet.performer = non_empty(&caps[1]),
            }
        } else if let Some(caps) = INDEX_RE.captures(line) {
            // The first INDEX 01 of a track is its start.
            if let Some(track) = current.as_mut().filter(|t| t.start.is_none()) {
                track.start = Some(CueTime {
                    minutes: caps[1].parse().unwrap_or(0),
                    seconds: caps[2].parse().unwrap_or(0),
                    frames: caps[3].parse().unwrap_or(0),
                });
            }
        }
    }

    if let Some(track) = current.and_then(PendingTrack::finish) {
        sheet.tracks.push(track);
    }
    sheet.tracks.sort_by_key(|t| t.number);
    sheet
}

/// `HH:MM:SS.mmm` as ffmpeg expects for `-ss`/`-t`.
pub fn ffmpeg_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let millis = total_ms % 60_000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        hours,
        minutes,
        millis / 1000,
        millis % 1000
    )
}

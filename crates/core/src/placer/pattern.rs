//! Naming templates: `{Field}` and zero-padded `{Field:N}` placeholders.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::error::PlacerError;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z]+)(?::(\d+))?\}").unwrap());
static ILLEGAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[/\\:*?"<>|]+"#).unwrap());
static DASH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());

const FIELDS: &[&str] = &["Artist", "Album", "Year", "Disc", "Track", "Title"];

pub const UNSORTED_ARTIST: &str = "_Unsorted";
pub const UNSORTED_ALBUM: &str = "Unsorted";

/// Values substituted into a template. Missing values render as empty.
#[derive(Debug, Clone, Default)]
pub struct PatternValues {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub disc: Option<u32>,
    pub track: Option<u32>,
    pub title: Option<String>,
}

enum Value<'a> {
    Text(&'a str),
    Number(i64),
    Empty,
}

impl PatternValues {
    fn get(&self, key: &str) -> Value<'_> {
        let value = match key {
            "Artist" => self.artist.as_deref().map(Value::Text),
            "Album" => self.album.as_deref().map(Value::Text),
            "Title" => self.title.as_deref().map(Value::Text),
            "Year" => self.year.map(|v| Value::Number(v as i64)),
            "Disc" => self.disc.map(|v| Value::Number(v as i64)),
            "Track" => self.track.map(|v| Value::Number(v as i64)),
            _ => None,
        };
        value.unwrap_or(Value::Empty)
    }
}

/// Strip characters illegal in file names, collapse whitespace, trim, and
/// drop trailing dots.
pub fn sanitize_name(value: &str) -> String {
    let replaced = ILLEGAL_RE.replace_all(value, " ");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches('.').trim_end().to_string()
}

/// Normalize dash separators and drop dangling dashes left by empty fields.
pub fn tidy(value: &str) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let dashed = DASH_RE.replace_all(&collapsed, " - ");
    let trimmed = dashed.trim();
    let trimmed = trimmed.strip_prefix('-').unwrap_or(trimmed).trim_start();
    let trimmed = trimmed.strip_suffix('-').unwrap_or(trimmed).trim_end();
    trimmed.to_string()
}

/// First value that is non-empty after sanitizing.
pub fn first_non_empty<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    values
        .into_iter()
        .flatten()
        .map(sanitize_name)
        .find(|s| !s.is_empty())
}

/// Render a template. Every substituted value is sanitized and the result
/// tidied.
pub fn apply_pattern(pattern: &str, values: &PatternValues) -> String {
    let rendered = PLACEHOLDER_RE.replace_all(pattern, |caps: &Captures<'_>| {
        let width = caps.get(2).and_then(|w| w.as_str().parse::<usize>().ok());
        match values.get(&caps[1]) {
            Value::Text(text) => sanitize_name(text),
            Value::Number(n) => match width {
                Some(width) => format!("{:0width$}", n, width = width),
                None => n.to_string(),
            },
            Value::Empty => String::new(),
        }
    });
    tidy(&rendered)
}

/// Reject blank templates, unbalanced braces and unknown fields.
pub fn validate_pattern(pattern: &str) -> Result<(), PlacerError> {
    if pattern.trim().is_empty() {
        return Err(PlacerError::invalid_pattern(pattern, "pattern is empty"));
    }

    let mut depth = 0usize;
    for c in pattern.chars() {
        match c {
            '{' if depth > 0 => {
                return Err(PlacerError::invalid_pattern(pattern, "nested '{'"));
            }
            '{' => depth += 1,
            '}' if depth == 0 => {
                return Err(PlacerError::invalid_pattern(pattern, "unmatched '}'"));
            }
            '}' => depth -= 1,
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PlacerError::invalid_pattern(pattern, "unclosed '{'"));
    }

    let placeholders = pattern.matches('{').count();
    let recognized: Vec<_> = PLACEHOLDER_RE.captures_iter(pattern).collect();
    if recognized.len() != placeholders {
        return Err(PlacerError::invalid_pattern(pattern, "malformed placeholder"));
    }
    for caps in recognized {
        if !FIELDS.contains(&&caps[1]) {
            return Err(PlacerError::invalid_pattern(
                pattern,
                format!("unknown field '{}'", &caps[1]),
            ));
        }
    }
    Ok(())
}

/// `root / artist folder / album folder` for an album.
pub fn album_dir(
    root: &Path,
    artist_pattern: &str,
    album_pattern: &str,
    artist: Option<&str>,
    album: Option<&str>,
    year: Option<i32>,
) -> PathBuf {
    let values = PatternValues {
        artist: Some(first_non_empty([artist]).unwrap_or_else(|| UNSORTED_ARTIST.to_string())),
        album: Some(first_non_empty([album]).unwrap_or_else(|| UNSORTED_ALBUM.to_string())),
        year,
        ..Default::default()
    };

    let artist_folder = non_empty_or(apply_pattern(artist_pattern, &values), UNSORTED_ARTIST);
    let album_folder = non_empty_or(apply_pattern(album_pattern, &values), UNSORTED_ALBUM);
    root.join(artist_folder).join(album_folder)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(track: u32, title: &str) -> PatternValues {
        PatternValues {
            track: Some(track),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_apply_pattern_pads_numbers() {
        assert_eq!(
            apply_pattern("{Track:2} - {Title}", &track(3, "Hey You")),
            "03 - Hey You"
        );
        assert_eq!(
            apply_pattern("{Track:3}. {Title}", &track(12, "x")),
            "012. x"
        );
        assert_eq!(apply_pattern("Disc {Disc}", &PatternValues {
            disc: Some(2),
            ..Default::default()
        }), "Disc 2");
    }

    #[test]
    fn test_apply_pattern_sanitizes_values() {
        assert_eq!(
            apply_pattern("{Track:2} - {Title}", &track(1, "AC/DC: Live?...")),
            "01 - AC DC Live"
        );
    }

    #[test]
    fn test_missing_values_are_tidied_away() {
        let values = PatternValues {
            album: Some("The Wall".to_string()),
            ..Default::default()
        };
        assert_eq!(apply_pattern("{Year} - {Album}", &values), "The Wall");
        assert_eq!(apply_pattern("{Album} - {Year}", &values), "The Wall");
        assert_eq!(apply_pattern("{Unknown}{Album}", &values), "The Wall");
    }

    #[test]
    fn test_sanitize_and_tidy() {
        assert_eq!(sanitize_name("  a  <b>  c.. "), "a b c");
        assert_eq!(sanitize_name("..."), "");
        assert_eq!(tidy("1979  -The Wall"), "1979 - The Wall");
        assert_eq!(tidy(" - Album"), "Album");
    }

    #[test]
    fn test_first_non_empty() {
        assert_eq!(
            first_non_empty([None, Some("  ?? "), Some("Title")]).as_deref(),
            Some("Title")
        );
        assert_eq!(first_non_empty([None, Some("")]), None);
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("{Year} - {Album}").is_ok());
        assert!(validate_pattern("{Track:2} - {Title}").is_ok());
        assert!(validate_pattern("Disc {Disc}").is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("   ").is_err());
        assert!(validate_pattern("{Year} - {Album").is_err());
        assert!(validate_pattern("{Year}} - {Album}").is_err());
        assert!(validate_pattern("{Genre}").is_err());
        assert!(validate_pattern("{Track:x}").is_err());
    }

    #[test]
    fn test_album_dir() {
        let dir = album_dir(
            Path::new("/music"),
            "{Artist}",
            "{Year} - {Album}",
            Some("Pink Floyd"),
            Some("The Wall"),
            Some(1979),
        );
        assert_eq!(dir, PathBuf::from("/music/Pink Floyd/1979 - The Wall"));

        let dir = album_dir(Path::new("/music"), "{Artist}", "{Year} - {Album}", None, Some(" "), None);
        assert_eq!(dir, PathBuf::from("/music/_Unsorted/Unsorted"));
    }
}

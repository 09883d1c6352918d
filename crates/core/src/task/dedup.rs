//! Dedup key construction.

use super::Scope;

/// Every field that participates in task identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupKeyInput<'a> {
    pub scope: Scope,
    pub query: Option<&'a str>,
    pub artist: Option<&'a str>,
    pub album: Option<&'a str>,
    pub year: Option<i32>,
    pub ext_artist_id: Option<&'a str>,
    pub ext_album_id: Option<&'a str>,
}

/// Lower-case, collapse whitespace runs and trim.
pub fn normalize_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Build the normalized identity string for a want.
///
/// Parts are `scope|query|artist|album|year|ext-artist|ext-album`, skipping
/// missing or blank values.
pub fn make_dedup_key(input: &DedupKeyInput<'_>) -> String {
    let mut parts = vec![input.scope.as_str().to_string()];

    let year = input.year.map(|y| y.to_string());
    let fields = [
        input.query,
        input.artist,
        input.album,
        year.as_deref(),
        input.ext_artist_id,
        input.ext_album_id,
    ];

    for value in fields.into_iter().flatten() {
        let normalized = normalize_part(value);
        if !normalized.is_empty() {
            parts.push(normalized);
        }
    }

    parts.join("|")
}

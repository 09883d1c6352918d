//! Transfer layout classification.
//!
//! A layout describes the physical shape of a transfer's files and decides how
//! (or whether) the library import can handle it.

mod pick;

pub use pick::pick_album_dir;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::download_client::TransferFile;
use crate::task::UnknownVariant;

const AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "mp3", "m4a", "wav", "ogg", "opus", "aiff", "alac", "aac", "ape", "wv",
];

static DISC_DIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(cd|disc|disk|диск)\s*\d{1,2}(\s*-.*)?$").unwrap()
});

/// Physical shape of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// No audio at all.
    Invalid,
    /// One album, possibly split into disc folders.
    SimpleAlbum,
    /// Several albums side by side.
    MultiAlbum,
    /// One audio image plus a cue sheet.
    SingleFileCue,
    /// Several audio files plus cue sheets.
    MultiFileCue,
    /// Several albums with cue sheets; rejected.
    MultiAlbumCue,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Invalid => "invalid",
            Layout::SimpleAlbum => "simple_album",
            Layout::MultiAlbum => "multi_album",
            Layout::SingleFileCue => "single_file_cue",
            Layout::MultiFileCue => "multi_file_cue",
            Layout::MultiAlbumCue => "multi_album_cue",
        }
    }

    /// Whether the library import knows how to handle this layout.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Layout::SimpleAlbum | Layout::MultiAlbum | Layout::SingleFileCue | Layout::MultiFileCue
        )
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layout {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(Layout::Invalid),
            "simple_album" => Ok(Layout::SimpleAlbum),
            "multi_album" => Ok(Layout::MultiAlbum),
            "single_file_cue" => Ok(Layout::SingleFileCue),
            "multi_file_cue" => Ok(Layout::MultiFileCue),
            "multi_album_cue" => Ok(Layout::MultiAlbumCue),
            other => Err(UnknownVariant::new("layout", other)),
        }
    }
}

/// Lower-cased extension without the dot.
pub fn extension(name: &str) -> Option<String> {
    let file = name.rsplit(['/', '\\']).next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn is_audio_file(name: &str) -> bool {
    extension(name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_cue_file(name: &str) -> bool {
    extension(name).is_some_and(|ext| ext == "cue")
}

/// Path segments of a manifest entry, ignoring leading separators.
pub fn path_parts(name: &str) -> Vec<&str> {
    name.split(['/', '\\']).filter(|p| !p.is_empty()).collect()
}

/// Directory segment `index` of a manifest entry; the file name is not a directory.
pub fn dir_segment(name: &str, index: usize) -> Option<&str> {
    let parts = path_parts(name);
    if parts.len() <= 1 {
        return None;
    }
    parts[..parts.len() - 1].get(index).copied()
}

/// Whether a directory name is a disc subdivision: `CD1`, `Disc 02`,
/// `disk_1`, `Диск 1`, `CD 1 - Bonus`.
pub fn is_disc_dir_name(name: &str) -> bool {
    let normalized = name
        .to_lowercase()
        .replace(['.', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    DISC_DIR_RE.is_match(&normalized)
}

/// Classify a transfer's file manifest.
pub fn classify(files: &[TransferFile]) -> Layout {
    let audio: Vec<&TransferFile> = files.iter().filter(|f| is_audio_file(&f.name)).collect();
    if audio.is_empty() {
        return Layout::Invalid;
    }
    let has_cue = files.iter().any(|f| is_cue_file(&f.name));

    let roots: BTreeSet<&str> = files.iter().filter_map(|f| dir_segment(&f.name, 0)).collect();
    let roots_are_discs = !roots.is_empty() && roots.iter().all(|r| is_disc_dir_name(r));

    let nested_albums: BTreeSet<&str> = audio
        .iter()
        .filter_map(|f| dir_segment(&f.name, 1))
        .filter(|d| !is_disc_dir_name(d))
        .collect();
    let nested_multi_album = roots.len() == 1 && nested_albums.len() > 1;

    if !has_cue {
        return if nested_multi_album {
            Layout::MultiAlbum
        } else if roots.len() <= 1 || roots_are_discs {
            Layout::SimpleAlbum
        } else {
            Layout::MultiAlbum
        };
    }

    if nested_multi_album {
        return Layout::MultiAlbumCue;
    }
    if roots.len() <= 1 {
        return if audio.len() == 1 {
            Layout::SingleFileCue
        } else {
            Layout::MultiFileCue
        };
    }
    if roots_are_discs {
        return Layout::MultiFileCue;
    }
    Layout::MultiAlbumCue
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(names: &[&str]) -> Vec<TransferFile> {
        names.iter().map(|n| TransferFile::new(*n, 1000)).collect()
    }

    #[test]
    fn test_single_directory_album() {
        let manifest = files(&[
            "Album/01 - One.flac",
            "Album/02 - Two.flac",
            "Album/03 - Three.flac",
            "Album/04 - Four.flac",
            "Album/05 - Five.flac",
            "Album/cover.jpg",
        ]);
        assert_eq!(classify(&manifest), Layout::SimpleAlbum);
    }

    #[test]
    fn test_disc_roots_are_one_album() {
        let manifest = files(&["CD1/01.flac", "CD1/02.flac", "CD2/01.flac"]);
        assert_eq!(classify(&manifest), Layout::SimpleAlbum);

        let manifest = files(&["Album/Disc 1/01.flac", "Album/Disc 2/01.flac"]);
        assert_eq!(classify(&manifest), Layout::SimpleAlbum);
    }

    #[test]
    fn test_nested_albums() {
        let manifest = files(&[
            "Discography/1979 - The Wall/01.flac",
            "Discography/1977 - Animals/01.flac",
        ]);
        assert_eq!(classify(&manifest), Layout::MultiAlbum);

        let manifest = files(&["The Wall/01.flac", "Animals/01.flac"]);
        assert_eq!(classify(&manifest), Layout::MultiAlbum);
    }

    #[test]
    fn test_cue_layouts() {
        let manifest = files(&["Album/image.flac", "Album/image.cue", "Album/log.txt"]);
        assert_eq!(classify(&manifest), Layout::SingleFileCue);

        let manifest = files(&[
            "Album/01.flac",
            "Album/02.flac",
            "Album/03.flac",
            "Album/album.cue",
        ]);
        assert_eq!(classify(&manifest), Layout::MultiFileCue);

        let manifest = files(&["CD1/a.ape", "CD1/a.cue", "CD2/b.ape", "CD2/b.cue"]);
        assert_eq!(classify(&manifest), Layout::MultiFileCue);
    }

    #[test]
    fn test_multi_album_cue() {
        let manifest = files(&[
            "Box/Album A/a.flac",
            "Box/Album A/a.cue",
            "Box/Album B/b.flac",
            "Box/Album B/b.cue",
        ]);
        assert_eq!(classify(&manifest), Layout::MultiAlbumCue);
        assert!(!Layout::MultiAlbumCue.is_supported());

        let manifest = files(&["A/a.flac", "A/a.cue", "B/b.flac"]);
        assert_eq!(classify(&manifest), Layout::MultiAlbumCue);
    }

    #[test]
    fn test_no_audio_is_invalid() {
        assert_eq!(classify(&[]), Layout::Invalid);
        assert_eq!(
            classify(&files(&["Movie/movie.mkv", "Movie/movie.srt"])),
            Layout::Invalid
        );
        assert!(!Layout::Invalid.is_supported());
    }

    #[test]
    fn test_root_level_files() {
        assert_eq!(classify(&files(&["01.mp3", "02.mp3"])), Layout::SimpleAlbum);
        assert_eq!(
            classify(&files(&["image.wv", "image.cue"])),
            Layout::SingleFileCue
        );
    }

    #[test]
    fn test_disc_dir_names() {
        for name in ["CD1", "cd 2", "Disc 01", "disk_3", "Диск 1", "CD 1 - Bonus", "disc.2"] {
            assert!(is_disc_dir_name(name), "{} should be a disc dir", name);
        }
        for name in ["Album", "CD", "Discography", "1979 - The Wall", "cd123"] {
            assert!(!is_disc_dir_name(name), "{} should not be a disc dir", name);
        }
    }

    #[test]
    fn test_file_kinds() {
        assert!(is_audio_file("a/B.FLAC"));
        assert!(!is_audio_file("flac"));
        assert!(!is_audio_file(".flac"));
        assert!(is_cue_file("x/Album.CUE"));
        assert_eq!(dir_segment("/a/b/c.flac", 1), Some("b"));
        assert_eq!(dir_segment("c.flac", 0), None);
    }

    #[test]
    fn test_layout_str_round_trip() {
        for layout in [
            Layout::Invalid,
            Layout::SimpleAlbum,
            Layout::MultiAlbum,
            Layout::SingleFileCue,
            Layout::MultiFileCue,
            Layout::MultiAlbumCue,
        ] {
            assert_eq!(layout.as_str().parse::<Layout>().unwrap(), layout);
            assert_eq!(
                serde_json::to_string(&layout).unwrap(),
                format!("\"{}\"", layout.as_str())
            );
        }
    }
}

//! Placing files into the music library.
//!
//! Destination names come from `{Field}` / `{Field:N}` templates. Every file
//! goes through `place_file`, which applies the collision policy and the
//! configured file mode (copy, hard link with copy fallback, or rename with
//! copy-then-delete fallback).

mod error;
mod fs_placer;
mod pattern;
mod rename;
mod types;

pub use error::PlacerError;
pub use fs_placer::{path_exists, place_file, remove_source_dir, resolve_collision};
pub use pattern::{
    album_dir, apply_pattern, first_non_empty, sanitize_name, tidy, validate_pattern,
    PatternValues, UNSORTED_ALBUM, UNSORTED_ARTIST,
};
pub use rename::{copy_with_renaming, guess_track_meta, is_cover_image, target_name, TrackGuess};
pub use types::{CollisionPolicy, FileMode, NamingPatterns, PlaceOutcome, PlacementReport};

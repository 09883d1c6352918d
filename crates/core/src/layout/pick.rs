//! Choosing one album out of a multi-album transfer.

use crate::download_client::TransferFile;
use crate::matching::{normalize_title_tokens, shared_token_count};

use super::{dir_segment, is_audio_file};

/// Directory prefix (relative to the transfer root) of the album whose
/// directory name shares the most tokens with `"<title> <year>"`.
///
/// With several top-level directories the choice is among them; with a single
/// wrapper directory it is among the wrapper's subdirectories holding audio,
/// and the returned prefix includes the wrapper. Ties keep the first directory
/// in manifest order.
pub fn pick_album_dir(files: &[TransferFile], title: &str, year: Option<i32>) -> Option<String> {
    let roots = unique(files.iter().filter_map(|f| dir_segment(&f.name, 0)));
    let target = normalize_title_tokens(&match year {
        Some(year) => format!("{} {}", title, year),
        None => title.to_string(),
    });

    match roots.len() {
        0 => None,
        1 => {
            let wrapper = roots[0];
            let nested = unique(
                files
                    .iter()
                    .filter(|f| is_audio_file(&f.name))
                    .filter_map(|f| dir_segment(&f.name, 1)),
            );
            match best(&nested, &target) {
                Some(dir) => Some(format!("{}/{}", wrapper, dir)),
                None => Some(wrapper.to_string()),
            }
        }
        _ => best(&roots, &target).map(str::to_string),
    }
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = Vec::new();
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
        }
    }
    seen
}

fn best<'a>(dirs: &[&'a str], target: &[String]) -> Option<&'a str> {
    let first = *dirs.first()?;
    if target.is_empty() {
        return Some(first);
    }

    let mut winner = first;
    let mut winner_score = shared_token_count(first, target);
    for dir in &dirs[1..] {
        let score = shared_token_count(dir, target);
        if score > winner_score {
            winner = dir;
            winner_score = score;
        }
    }
    Some(winner)
}

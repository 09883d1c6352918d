//! Locating the downloaded files of a task on disk.

use std::path::{Path, PathBuf};

use crate::download_client::TransferFile;
use crate::layout::path_parts;

/// Split off the directory every manifest entry shares.
///
/// Returns the root (if all entries live under one top-level directory) and
/// the entries renamed relative to it.
pub fn strip_common_root(files: &[TransferFile]) -> (Option<String>, Vec<TransferFile>) {
    let first_dirs: Vec<Option<&str>> = files
        .iter()
        .map(|f| {
            let parts = path_parts(&f.name);
            (parts.len() > 1).then(|| parts[0])
        })
        .collect();

    let root = match first_dirs.first() {
        Some(Some(root)) if first_dirs.iter().all(|d| *d == Some(*root)) => root.to_string(),
        _ => return (None, files.to_vec()),
    };

    let relative = files
        .iter()
        .map(|f| {
            let parts = path_parts(&f.name);
            TransferFile::new(parts[1..].join("/"), f.size)
        })
        .collect();
    (Some(root), relative)
}

/// Keep only the entries under `dir` and make them relative to it.
pub fn files_under(files: &[TransferFile], dir: &str) -> Vec<TransferFile> {
    let prefix: Vec<&str> = path_parts(dir);
    files
        .iter()
        .filter_map(|f| {
            let parts = path_parts(&f.name);
            (parts.len() > prefix.len() && parts[..prefix.len()] == prefix[..])
                .then(|| TransferFile::new(parts[prefix.len()..].join("/"), f.size))
        })
        .collect()
}

/// Join a `/`-separated relative path onto `base`.
pub fn join_relative(base: &Path, relative: &str) -> PathBuf {
    path_parts(relative)
        .into_iter()
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

/// Every regular file under `root`, relative to it, sorted by name.
pub async fn walk_files(root: &Path) -> std::io::Result<Vec<TransferFile>> {
    let mut found = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative));
            } else if file_type.is_file() {
                let size = entry.metadata().await?.len();
                found.push(TransferFile::new(relative, size));
            }
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names(files: &[TransferFile]) -> Vec<&str> {
        files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_strip_common_root() {
        let files = vec![
            TransferFile::new("Album/01.flac", 1),
            TransferFile::new("Album/CD2/02.flac", 1),
        ];
        let (root, relative) = strip_common_root(&files);
        assert_eq!(root.as_deref(), Some("Album"));
        assert_eq!(names(&relative), vec!["01.flac", "CD2/02.flac"]);
    }

    #[test]
    fn test_no_common_root() {
        let split = vec![TransferFile::new("A/01.flac", 1), TransferFile::new("B/01.flac", 1)];
        assert_eq!(strip_common_root(&split).0, None);

        let loose = vec![TransferFile::new("Album/01.flac", 1), TransferFile::new("x.cue", 1)];
        assert_eq!(strip_common_root(&loose).0, None);

        assert_eq!(strip_common_root(&[]).0, None);
    }

    #[test]
    fn test_files_under() {
        let files = vec![
            TransferFile::new("Box/1979 - The Wall/01.flac", 1),
            TransferFile::new("Box/1975 - Wish/01.flac", 1),
            TransferFile::new("Box/1979 - The Wall/cover.jpg", 1),
        ];
        let picked = files_under(&files, "Box/1979 - The Wall");
        assert_eq!(names(&picked), vec!["01.flac", "cover.jpg"]);
    }

    #[tokio::test]
    async fn test_walk_files() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("CD1")).await.unwrap();
        tokio::fs::write(dir.path().join("CD1/01.flac"), b"abc").await.unwrap();
        tokio::fs::write(dir.path().join("album.cue"), b"x").await.unwrap();

        let files = walk_files(dir.path()).await.unwrap();
        assert_eq!(names(&files), vec!["CD1/01.flac", "album.cue"]);
        assert_eq!(files[0].size, 3);
    }
}

//! Take discovery.
//!
//! A phrase directory holds one audio file per take. Discovery is sorted
//! and deterministic so take ordering (and therefore tie-breaking in the
//! rankings) never depends on filesystem iteration order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Audio extensions recognised as takes.
pub const TAKE_EXTENSIONS: &[&str] = &["aac", "flac", "m4a", "mp3", "ogg", "wav"];

/// A discovered take: its id (file stem) and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeFile {
    pub id: String,
    pub path: PathBuf,
}

/// List the takes in a phrase directory, sorted by path.
///
/// Files with unrecognized extensions are ignored. An empty or missing
/// directory is an error since a comping run cannot proceed without takes.
pub fn find_takes<P: AsRef<Path>>(phrase_dir: P) -> crate::Result<Vec<TakeFile>> {
    let dir = phrase_dir.as_ref();
    if !dir.is_dir() {
        return Err(crate::Error::MissingInput(format!(
            "phrase directory not found: {}",
            dir.display()
        )));
    }

    let ext_set: BTreeSet<String> = TAKE_EXTENSIONS.iter().map(|e| e.to_string()).collect();

    let mut paths = BTreeSet::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matched = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| ext_set.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false);
        if matched {
            paths.insert(path);
        }
    }

    let takes: Vec<TakeFile> = paths
        .into_iter()
        .filter_map(|path| {
            let id = path.file_stem()?.to_str()?.to_string();
            Some(TakeFile { id, path })
        })
        .collect();

    if takes.is_empty() {
        return Err(crate::Error::MissingInput(format!(
            "no audio takes in {}",
            dir.display()
        )));
    }
    Ok(takes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_sorted_takes() {
        let tmp = std::env::temp_dir().join("vocomp_find_takes_test");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        fs::write(tmp.join("take_2.wav"), b"").unwrap();
        fs::write(tmp.join("take_1.wav"), b"").unwrap();
        fs::write(tmp.join("take_3.FLAC"), b"").unwrap();
        fs::write(tmp.join("notes.txt"), b"").unwrap();

        let takes = find_takes(&tmp).unwrap();
        let ids: Vec<&str> = takes.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["take_1", "take_2", "take_3"]);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let tmp = std::env::temp_dir().join("vocomp_find_takes_empty");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        assert!(find_takes(&tmp).is_err());
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(find_takes("/nonexistent/vocomp-phrase").is_err());
    }
}

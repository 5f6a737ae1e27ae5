//! Input file selection.
//!
//! The fetcher drops exports into the data directory named
//! `<kind-prefix><unix-timestamp>.csv`. Each pipeline run selects at most
//! one file per record kind: the one with the greatest embedded timestamp,
//! falling back to filesystem mtime when the filename carries none that
//! parses. No matching file is a valid, non-error outcome; the orchestrator
//! simply skips that kind for the run.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;
use walkdir::WalkDir;

use crate::dataset::DatasetKind;

#[derive(Debug, Clone)]
pub struct LocatedFile {
    pub path: PathBuf,
    /// Unix-seconds selection key: the filename's embedded timestamp when it
    /// parsed, otherwise the file's modification time.
    pub selected_by: i64,
}

pub fn find_latest(dir: &Path, kind: DatasetKind) -> Result<Option<LocatedFile>> {
    if !dir.exists() {
        bail!("data directory does not exist: {}", dir.display());
    }

    let prefix = kind.file_prefix();
    let mut best: Option<LocatedFile> = None;

    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let Some(stem) = name.strip_prefix(prefix).and_then(|s| s.strip_suffix(".csv"))
        else {
            continue;
        };

        let key = match stem.parse::<i64>() {
            Ok(ts) => ts,
            Err(_) => {
                warn!(file = %name, "unparseable timestamp in filename, falling back to mtime");
                mtime_secs(entry.path())
            }
        };

        let better = match &best {
            Some(current) => {
                key > current.selected_by
                    // Deterministic tie-break on path so repeated runs agree.
                    || (key == current.selected_by && entry.path() > current.path.as_path())
            }
            None => true,
        };
        if better {
            best = Some(LocatedFile {
                path: entry.path().to_path_buf(),
                selected_by: key,
            });
        }
    }

    Ok(best)
}

fn mtime_secs(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_dir_is_none() {
        let tmp = TempDir::new().unwrap();
        let found = find_latest(tmp.path(), DatasetKind::Detail).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_missing_dir_is_error() {
        let result = find_latest(Path::new("/definitely/not/here"), DatasetKind::Detail);
        assert!(result.is_err());
    }

    #[test]
    fn test_picks_greatest_embedded_timestamp() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("usda_rural_data_1700000000.csv"), "old").unwrap();
        fs::write(tmp.path().join("usda_rural_data_1800000000.csv"), "new").unwrap();

        let found = find_latest(tmp.path(), DatasetKind::Detail)
            .unwrap()
            .unwrap();
        assert!(found
            .path
            .to_string_lossy()
            .ends_with("usda_rural_data_1800000000.csv"));
        assert_eq!(found.selected_by, 1_800_000_000);
    }

    #[test]
    fn test_ignores_other_kind_and_extensions() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("usda_historical_data_1800000000.csv"), "x").unwrap();
        fs::write(tmp.path().join("usda_rural_data_1800000000.txt"), "x").unwrap();

        let found = find_latest(tmp.path(), DatasetKind::Detail).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_mtime() {
        let tmp = TempDir::new().unwrap();
        // Written now, so mtime dwarfs the old embedded timestamp below.
        fs::write(tmp.path().join("usda_rural_data_reexport.csv"), "manual").unwrap();
        fs::write(tmp.path().join("usda_rural_data_1000000000.csv"), "old").unwrap();

        let found = find_latest(tmp.path(), DatasetKind::Detail)
            .unwrap()
            .unwrap();
        assert!(found
            .path
            .to_string_lossy()
            .ends_with("usda_rural_data_reexport.csv"));
    }
}

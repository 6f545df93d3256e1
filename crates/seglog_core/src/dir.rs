//! Log directory layout.
//!
//! A log directory is flat; every segment is a pair of files named after its
//! base offset in decimal:
//!
//! ```text
//! <log_dir>/
//! ├─ 0.store       # length-prefixed records of segment 0
//! ├─ 0.index       # offset index of segment 0
//! ├─ 85.store
//! └─ 85.index
//! ```

use crate::error::CoreResult;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extension of segment store files.
pub const STORE_EXTENSION: &str = "store";
/// Extension of segment index files.
pub const INDEX_EXTENSION: &str = "index";

/// Returns the store file path of the segment at `base_offset`.
#[must_use]
pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.{STORE_EXTENSION}"))
}

/// Returns the index file path of the segment at `base_offset`.
#[must_use]
pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.{INDEX_EXTENSION}"))
}

/// Lists the distinct segment base offsets found in `dir`, ascending.
///
/// The store and index file of a segment both name the same base offset; it
/// is returned once. Files with other extensions or a stem that is not a
/// decimal offset are skipped.
pub fn scan_base_offsets(dir: &Path) -> CoreResult<Vec<u64>> {
    let mut offsets = BTreeSet::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        let is_segment_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == STORE_EXTENSION || ext == INDEX_EXTENSION);

        let base_offset = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok());

        match base_offset {
            Some(offset) if is_segment_file => {
                offsets.insert(offset);
            }
            _ => debug!(path = %path.display(), "skipping non-segment file"),
        }
    }

    Ok(offsets.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn segment_file_names() {
        let dir = Path::new("/logs");
        assert_eq!(store_path(dir, 16), Path::new("/logs/16.store"));
        assert_eq!(index_path(dir, 16), Path::new("/logs/16.index"));
    }

    #[test]
    fn scan_deduplicates_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["19.store", "19.index", "3.index", "3.store", "100.store"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let offsets = scan_base_offsets(dir.path()).unwrap();
        assert_eq!(offsets, vec![3, 19, 100]);
    }

    #[test]
    fn scan_skips_foreign_files() {
        let dir = tempdir().unwrap();
        for name in ["7.store", "notes.txt", "abc.store", "8.log", "LOCK"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let offsets = scan_base_offsets(dir.path()).unwrap();
        assert_eq!(offsets, vec![7]);
    }

    #[test]
    fn scan_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(scan_base_offsets(dir.path()).unwrap().is_empty());
    }
}

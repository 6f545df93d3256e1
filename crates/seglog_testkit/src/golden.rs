//! Golden byte layouts of segment files.
//!
//! The store and index formats are fixed; these vectors pin the exact bytes
//! a closed log leaves on disk so that any format drift fails loudly.

use crate::fixtures::append_values;
use seglog_core::{dir, Config, Log};
use std::fs;
use std::path::Path;

/// A sequence of appends and the segment files it must produce.
#[derive(Debug, Clone)]
pub struct LayoutVector {
    /// Description of the test case
    pub description: &'static str,
    /// Offset of the first record
    pub initial_offset: u64,
    /// Values appended in order
    pub values: &'static [&'static [u8]],
    /// Expected store file bytes (hex-encoded)
    pub store_hex: &'static str,
    /// Expected index file bytes (hex-encoded)
    pub index_hex: &'static str,
}

impl LayoutVector {
    /// Writes the vector's values to a fresh log in `dir`, closes it, and
    /// returns the `(store, index)` bytes of its single segment.
    pub fn produce(&self, log_dir: &Path) -> (Vec<u8>, Vec<u8>) {
        let log = Log::open(log_dir, Config::new().initial_offset(self.initial_offset))
            .expect("Failed to open log");
        append_values(&log, self.values);
        log.close().expect("Failed to close log");

        let store = fs::read(dir::store_path(log_dir, self.initial_offset))
            .expect("Failed to read store file");
        let index = fs::read(dir::index_path(log_dir, self.initial_offset))
            .expect("Failed to read index file");
        (store, index)
    }

    /// Asserts that a log built from this vector matches it byte for byte.
    pub fn verify(&self, log_dir: &Path) {
        let (store, index) = self.produce(log_dir);
        assert_hex(self.description, "store", self.store_hex, &store);
        assert_hex(self.description, "index", self.index_hex, &index);
    }
}

/// Returns the standard segment layout vectors.
#[must_use]
pub fn layout_vectors() -> Vec<LayoutVector> {
    vec![
        LayoutVector {
            description: "Single record",
            initial_offset: 0,
            values: &[b"hello"],
            store_hex: "000000000000000d 0000000000000000 68656c6c6f",
            index_hex: "00000000 0000000000000000",
        },
        LayoutVector {
            description: "Empty value",
            initial_offset: 0,
            values: &[b""],
            store_hex: "0000000000000008 0000000000000000",
            index_hex: "00000000 0000000000000000",
        },
        LayoutVector {
            description: "Two records from offset 16",
            initial_offset: 16,
            values: &[b"a", b"bc"],
            store_hex: "0000000000000009 0000000000000010 61
                        000000000000000a 0000000000000011 6263",
            index_hex: "00000000 0000000000000000
                        00000001 0000000000000011",
        },
        LayoutVector {
            description: "No records",
            initial_offset: 7,
            values: &[],
            store_hex: "",
            index_hex: "",
        },
    ]
}

fn assert_hex(description: &str, file: &str, expected_hex: &str, actual: &[u8]) {
    let expected = hex_decode(expected_hex);
    assert!(
        expected == actual,
        "Layout '{}' failed for {} file:\n\
         Expected ({} bytes): {}\n\
         Actual ({} bytes): {}",
        description,
        file,
        expected.len(),
        hex_encode(&expected),
        actual.len(),
        hex_encode(actual)
    );
}

/// Encodes bytes as hexadecimal string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decodes hexadecimal string to bytes, ignoring whitespace.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let hex: String = hex.split_whitespace().collect();
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hex_roundtrip() {
        let bytes = vec![0x00, 0x01, 0xab, 0xff];
        assert_eq!(hex_encode(&bytes), "0001abff");
        assert_eq!(hex_decode("00 01\n ab ff"), bytes);
    }

    #[test]
    fn test_layout_vectors() {
        for vector in layout_vectors() {
            let dir = tempdir().unwrap();
            vector.verify(&dir.path().join("log"));
        }
    }

    #[test]
    fn test_full_reader_matches_store_layout() {
        use std::io::Read;

        let dir = tempdir().unwrap();
        let vectors = layout_vectors();
        let vector = &vectors[2];
        let log_dir = dir.path().join("log");

        let log = Log::open(&log_dir, Config::new().initial_offset(vector.initial_offset)).unwrap();
        append_values(&log, vector.values);

        let mut bytes = Vec::new();
        log.full_reader().unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, hex_decode(vector.store_hex));
    }
}

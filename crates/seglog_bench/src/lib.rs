//! Benchmark utilities for SegLog.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::Rng;
use seglog_core::{CommitLog, Config, Log, Record};
use tempfile::TempDir;

/// Generate random record data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random offsets in `[lowest, lowest + span)`.
pub fn random_offsets(lowest: u64, span: u64, count: usize) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| lowest + rng.gen_range(0..span.max(1)))
        .collect()
}

/// Open a log in a new temporary directory and append `records` values of
/// `value_size` random bytes.
///
/// The directory is returned alongside the log and must outlive it.
pub fn populated_log(config: Config, records: usize, value_size: usize) -> (TempDir, Log) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let log = Log::open(temp_dir.path(), config).expect("Failed to open log");

    let value = random_data(value_size);
    for _ in 0..records {
        log.append(Record::new(value.clone()))
            .expect("Failed to append record");
    }

    (temp_dir, log)
}

//! Test fixtures and log helpers.
//!
//! Provides convenience functions for setting up logs in temporary
//! directories, reopening them, and simulating a process that dies without
//! closing its log.

use seglog_core::{CommitLog, Config, Log, Record};
use seglog_storage::ENTRY_WIDTH;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A log in a temporary directory with automatic cleanup.
pub struct TestLog {
    /// The log instance.
    pub log: Log,
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestLog {
    /// Opens a log with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Opens a log with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log = Log::open(log_dir(&temp_dir), config).expect("Failed to open log");

        Self {
            log,
            config,
            temp_dir,
        }
    }

    /// Returns the log directory.
    pub fn path(&self) -> PathBuf {
        log_dir(&self.temp_dir)
    }

    /// Returns the configuration the log was opened with.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Closes the log cleanly and opens it again from disk.
    pub fn reopen(mut self) -> Self {
        self.reopen_in_place();
        self
    }

    /// Closes the log cleanly and opens it again with another configuration.
    pub fn reopen_with_config(mut self, config: Config) -> Self {
        self.config = config;
        self.reopen_in_place();
        self
    }

    /// Closes the log cleanly and replaces it with a freshly opened one.
    pub fn reopen_in_place(&mut self) {
        self.log.close().expect("Failed to close log");
        self.log = Log::open(self.path(), self.config).expect("Failed to reopen log");
    }

    /// Drops the log without closing it and opens it again from disk.
    ///
    /// Buffered store bytes are lost and every index file is left at its
    /// preallocated length, as after a process crash.
    pub fn crash(self) -> Self {
        let Self {
            log,
            config,
            temp_dir,
        } = self;

        std::mem::forget(log);

        let log = Log::open(log_dir(&temp_dir), config).expect("Failed to reopen log");
        Self {
            log,
            config,
            temp_dir,
        }
    }
}

impl Default for TestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestLog {
    type Target = Log;

    fn deref(&self) -> &Self::Target {
        &self.log
    }
}

fn log_dir(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("log")
}

/// Runs a test with a log in a temporary directory.
///
/// # Example
///
/// ```rust,ignore
/// use seglog_testkit::with_temp_log;
///
/// #[test]
/// fn my_test() {
///     with_temp_log(|log| {
///         // use log
///     });
/// }
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&Log) -> R,
{
    let log = TestLog::new();
    f(&log)
}

/// Configuration whose segments hold at most `entries` records.
pub fn small_segments(entries: u64) -> Config {
    Config::new()
        .max_store_bytes(1 << 20)
        .max_index_bytes(ENTRY_WIDTH * entries)
}

/// Appends every value and returns the assigned offsets.
pub fn append_values<L, V>(log: &L, values: &[V]) -> Vec<u64>
where
    L: CommitLog + ?Sized,
    V: AsRef<[u8]>,
{
    values
        .iter()
        .map(|value| {
            log.append(Record::new(value.as_ref()))
                .expect("Failed to append record")
        })
        .collect()
}

/// Reads the values at `offsets`, in order.
pub fn read_values<L>(log: &L, offsets: impl IntoIterator<Item = u64>) -> Vec<Vec<u8>>
where
    L: CommitLog + ?Sized,
{
    offsets
        .into_iter()
        .map(|offset| log.read(offset).expect("Failed to read record").value)
        .collect()
}

/// Numbered test values `value-0`, `value-1`, ...
pub fn numbered_values(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| format!("value-{i}").into_bytes())
        .collect()
}

/// Returns the sorted file names in `dir`.
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read directory")
        .map(|entry| {
            entry
                .expect("Failed to read directory entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

//! Crash recovery testing for SegLog.
//!
//! This module provides utilities for testing recovery after the process
//! owning a log dies without closing it. It simulates crashes at various
//! points and verifies that the log reopens with exactly the records whose
//! bytes reached the store files.
//!
//! ## Test Strategy
//!
//! 1. **Crash before flush** - Buffered records in the active segment are lost
//! 2. **Crash after flush** - Flushed records survive
//! 3. **Crash between flushes** - Records up to the last flush or rotation survive
//! 4. **Torn write** - A final record cut short is dropped
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seglog_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//!
//! let result = CrashRecoveryHarness::new(config).run(CrashPoint::AfterFlush, 10);
//! assert!(result.passed, "{:?}", result.error);
//! ```

use crate::fixtures::{append_values, numbered_values, TestLog};
use seglog_core::{dir, CommitLog, Config, CoreError, Log, Record};
use std::fs::OpenOptions;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash with all appends still buffered.
    BeforeFlush,
    /// Crash right after a flush.
    AfterFlush,
    /// Crash after a flush, with more appends buffered on top.
    BetweenFlushes,
    /// Crash after a clean close whose last store write was torn.
    TornWrite,
}

impl CrashPoint {
    /// All crash points.
    pub const ALL: [CrashPoint; 4] = [
        CrashPoint::BeforeFlush,
        CrashPoint::AfterFlush,
        CrashPoint::BetweenFlushes,
        CrashPoint::TornWrite,
    ];
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Records expected after recovery.
    pub expected_records: u64,
    /// Records found after recovery.
    pub actual_records: u64,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, records: u64) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_records: records,
            actual_records: records,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: u64, actual: u64, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    config: Config,
}

impl CrashRecoveryHarness {
    /// Creates a harness whose logs use `config`.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Appends `records` values, crashes at `point`, reopens and verifies.
    pub fn run(&self, point: CrashPoint, records: usize) -> CrashRecoveryResult {
        let description = format!("{point:?} after {records} appends");
        let values = numbered_values(records);
        let log = TestLog::with_config(self.config);

        let expected = match point {
            CrashPoint::BeforeFlush => {
                append_values(&*log, &values);
                durable_records(&log)
            }
            CrashPoint::AfterFlush => {
                append_values(&*log, &values);
                log.flush().expect("Failed to flush log");
                records as u64
            }
            CrashPoint::BetweenFlushes => {
                let half = records / 2;
                append_values(&*log, &values[..half]);
                log.flush().expect("Failed to flush log");
                append_values(&*log, &values[half..]);
                durable_records(&log).max(half as u64)
            }
            CrashPoint::TornWrite => {
                append_values(&*log, &values);
                log.close().expect("Failed to close log");
                if tear_last_record(&log) {
                    records as u64 - 1
                } else {
                    records as u64
                }
            }
        };

        let log = if point == CrashPoint::TornWrite {
            log.reopen_with_config(self.config)
        } else {
            log.crash()
        };

        verify_recovery(&description, &log, &values, expected)
    }

    /// Runs every crash point and returns the results.
    pub fn run_all(&self, records: usize) -> Vec<CrashRecoveryResult> {
        CrashPoint::ALL
            .iter()
            .map(|&point| self.run(point, records))
            .collect()
    }
}

/// Records held by segments other than the active one.
///
/// Rotation flushes the retired segment, so these survive any crash.
fn durable_records(log: &Log) -> u64 {
    let ranges = log.segment_ranges();
    match (ranges.first(), ranges.last()) {
        (Some(first), Some(active)) => active.start - first.start,
        _ => 0,
    }
}

/// Cuts the final store frame of the active segment short.
///
/// Returns false if the active segment holds no records.
fn tear_last_record(log: &TestLog) -> bool {
    let bases = dir::scan_base_offsets(&log.path()).expect("Failed to scan log dir");
    let Some(&base) = bases.last() else {
        return false;
    };

    let path = dir::store_path(&log.path(), base);
    let len = std::fs::metadata(&path).expect("Failed to stat store").len();
    if len == 0 {
        return false;
    }

    OpenOptions::new()
        .write(true)
        .open(&path)
        .and_then(|file| file.set_len(len - 1))
        .expect("Failed to tear store");
    true
}

/// Checks that exactly the first `expected` values are readable and that
/// the next append continues right after them.
fn verify_recovery(
    description: &str,
    log: &TestLog,
    values: &[Vec<u8>],
    expected: u64,
) -> CrashRecoveryResult {
    let initial = log.config().segment.initial_offset;

    let Some(active) = log.segment_ranges().pop() else {
        return CrashRecoveryResult::fail(description, expected, 0, "log has no segments");
    };
    let actual = active.end - initial;

    if actual != expected {
        return CrashRecoveryResult::fail(
            description,
            expected,
            actual,
            "recovered record count mismatch",
        );
    }

    for (i, value) in values.iter().take(expected as usize).enumerate() {
        let offset = initial + i as u64;
        match log.read(offset) {
            Ok(record) if record.value == *value && record.offset == offset => {}
            Ok(_) => {
                return CrashRecoveryResult::fail(
                    description,
                    expected,
                    actual,
                    &format!("record {offset} differs after recovery"),
                )
            }
            Err(err) => {
                return CrashRecoveryResult::fail(description, expected, actual, &err.to_string())
            }
        }
    }

    let next = initial + expected;
    if !matches!(log.read(next), Err(CoreError::OffsetOutOfRange { .. })) {
        return CrashRecoveryResult::fail(
            description,
            expected,
            actual,
            &format!("offset {next} readable after recovery"),
        );
    }

    match log.append(Record::new(b"after-recovery".to_vec())) {
        Ok(offset) if offset == next => CrashRecoveryResult::pass(description, expected),
        Ok(offset) => CrashRecoveryResult::fail(
            description,
            expected,
            actual,
            &format!("append after recovery got offset {offset}, expected {next}"),
        ),
        Err(err) => CrashRecoveryResult::fail(description, expected, actual, &err.to_string()),
    }
}

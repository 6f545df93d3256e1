//! Stress tests for SegLog.
//!
//! These tests verify behavior under heavy load and concurrent access.

use seglog_core::{CommitLog, Log, Record};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of each record value in bytes.
    pub value_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            value_size: 256,
        }
    }
}

/// Run a sequential append stress test.
pub fn stress_sequential_appends(log: &Log, config: &StressConfig) -> StressTestResult {
    let value = vec![0xABu8; config.value_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for _ in 0..config.operations {
        match log.append(Record::new(value.clone())) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a sequential read stress test over every offset in the log.
///
/// Appends `operations` records first if the log is empty.
pub fn stress_sequential_reads(log: &Log, config: &StressConfig) -> StressTestResult {
    if log.segment_ranges().iter().all(|range| range.is_empty()) {
        stress_sequential_appends(log, config);
    }

    let lowest = log.lowest_offset().unwrap_or(0);
    let highest = log.highest_offset().unwrap_or(0);

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for offset in lowest..=highest {
        match log.read(offset) {
            Ok(record) if record.offset == offset => successful += 1,
            _ => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent append stress test.
///
/// Every thread appends `operations / threads` records. Afterwards the
/// assigned offsets must form one gapless run, and each record must read
/// back with the value its thread wrote; every offset that breaks either
/// rule counts as a failed operation.
pub fn stress_concurrent_appends(log: Arc<Log>, config: &StressConfig) -> StressTestResult {
    let ops_per_thread = config.operations / config.threads;
    let value_size = config.value_size;
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let log = Arc::clone(&log);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                let value = thread_value(t, value_size);
                let mut offsets = Vec::with_capacity(ops_per_thread);
                for _ in 0..ops_per_thread {
                    match log.append(Record::new(value.clone())) {
                        Ok(offset) => offsets.push((offset, t)),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                offsets
            })
        })
        .collect();

    let mut assigned: Vec<(u64, usize)> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("Thread panicked"))
        .collect();
    let duration = start.elapsed();

    assigned.sort_unstable();
    let mut failed = failed.load(Ordering::Relaxed);
    let mut successful = 0usize;

    let first = assigned.first().map_or(0, |&(offset, _)| offset);
    for (i, &(offset, t)) in assigned.iter().enumerate() {
        let in_sequence = offset == first + i as u64;
        let reads_back = log
            .read(offset)
            .is_ok_and(|record| record.value == thread_value(t, value_size));

        if in_sequence && reads_back {
            successful += 1;
        } else {
            failed += 1;
        }
    }

    StressTestResult::new(successful, failed, duration)
}

/// Run a concurrent read stress test against a populated log.
pub fn stress_concurrent_reads(log: Arc<Log>, config: &StressConfig) -> StressTestResult {
    if log.segment_ranges().iter().all(|range| range.is_empty()) {
        stress_sequential_appends(&log, config);
    }

    let lowest = log.lowest_offset().unwrap_or(0);
    let span = (log.highest_offset().unwrap_or(0) + 1)
        .saturating_sub(lowest)
        .max(1);

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let log = Arc::clone(&log);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    let offset = lowest + ((t * ops_per_thread + i) as u64) % span;

                    match log.read(offset) {
                        Ok(_) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Run appenders and readers side by side.
///
/// Half of the threads append; the others repeatedly read the highest
/// offset they can see, which must always be readable.
pub fn stress_mixed_operations(log: Arc<Log>, config: &StressConfig) -> StressTestResult {
    let threads = config.threads.max(2);
    let ops_per_thread = config.operations / threads;
    let value = vec![0xCDu8; config.value_size];

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    // readers need something to read from the start
    if log.append(Record::new(value.clone())).is_err() {
        failed.fetch_add(1, Ordering::Relaxed);
    }

    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let log = Arc::clone(&log);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let value = value.clone();

            thread::spawn(move || {
                for _ in 0..ops_per_thread {
                    let ok = if t % 2 == 0 {
                        log.append(Record::new(value.clone())).is_ok()
                    } else {
                        log.highest_offset()
                            .and_then(|offset| log.read(offset))
                            .is_ok_and(|record| record.value == value)
                    };

                    let counter = if ok { &successful } else { &failed };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// A value that identifies the thread that wrote it.
fn thread_value(thread: usize, size: usize) -> Vec<u8> {
    let mut value = format!("thread-{thread}:").into_bytes();
    value.resize(size.max(value.len()), b'.');
    value
}

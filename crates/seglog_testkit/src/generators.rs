//! Property-based test generators using proptest.
//!
//! Provides strategies for generating record values, log configurations and
//! operation sequences.

use proptest::prelude::*;
use seglog_core::{Config, Record};
use seglog_storage::ENTRY_WIDTH;

/// Strategy for generating record values (arbitrary bytes, possibly empty).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating records with an arbitrary caller-supplied offset.
///
/// The log overwrites the offset on append.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    (any::<u64>(), value_strategy()).prop_map(|(offset, value)| Record { offset, value })
}

/// Strategy for generating a batch of values.
pub fn values_strategy(min: usize, max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(value_strategy(), min..max)
}

/// Strategy for generating configurations with small segments, so that a
/// handful of appends crosses several segment boundaries.
pub fn config_strategy() -> impl Strategy<Value = Config> {
    (1u64..8, 32u64..512, 0u64..1000).prop_map(|(entries, store_bytes, initial)| {
        Config::new()
            .max_index_bytes(ENTRY_WIDTH * entries)
            .max_store_bytes(store_bytes)
            .initial_offset(initial)
    })
}

/// An operation against a log.
#[derive(Debug, Clone)]
pub enum LogOperation {
    /// Append a value.
    Append {
        /// Value to append
        value: Vec<u8>,
    },
    /// Read back the n-th append, modulo the number of appends so far.
    Read {
        /// Index into the appends made so far
        nth: usize,
    },
    /// Close and reopen the log.
    Reopen,
}

/// Strategy for generating log operations.
pub fn log_operation_strategy() -> impl Strategy<Value = LogOperation> {
    prop_oneof![
        6 => value_strategy().prop_map(|value| LogOperation::Append { value }),
        3 => any::<usize>().prop_map(|nth| LogOperation::Read { nth }),
        1 => Just(LogOperation::Reopen),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<LogOperation>> {
    prop::collection::vec(log_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

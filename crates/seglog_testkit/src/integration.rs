//! Cross-crate integration test helpers.
//!
//! Provides a harness that drives a log and checks it against a simple
//! in-memory model of what it should contain.

use crate::fixtures::TestLog;
use crate::generators::LogOperation;
use seglog_core::{CommitLog, Config, CoreError, Record};

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The log under test.
    pub log: TestLog,
    /// Every value appended so far, by offset minus the initial offset.
    values: Vec<Vec<u8>>,
    initial_offset: u64,
}

impl IntegrationHarness {
    /// Creates a harness over a fresh log with `config`.
    pub fn new(config: Config) -> Self {
        Self {
            log: TestLog::with_config(config),
            values: Vec::new(),
            initial_offset: config.segment.initial_offset,
        }
    }

    /// Appends a value and checks the offset it was assigned.
    pub fn append(&mut self, value: Vec<u8>) -> u64 {
        let expected = self.initial_offset + self.values.len() as u64;
        let offset = self
            .log
            .append(Record::new(value.clone()))
            .expect("Failed to append record");

        assert_eq!(offset, expected, "offsets must be gapless");
        self.values.push(value);
        offset
    }

    /// Reads the n-th appended record back and verifies it.
    pub fn read_and_verify(&self, nth: usize) {
        let Some(expected) = self.values.get(nth) else {
            return;
        };
        let offset = self.initial_offset + nth as u64;
        let record = self.log.read(offset).expect("Failed to read record");

        assert_eq!(record.offset, offset);
        assert_eq!(&record.value, expected, "value mismatch at offset {offset}");
    }

    /// Closes and reopens the log, then checks nothing moved.
    pub fn reopen(&mut self) {
        let highest = self.log.highest_offset().expect("Failed to query log");

        self.log.reopen_in_place();

        assert_eq!(self.log.highest_offset().expect("Failed to query log"), highest);
    }

    /// Applies one generated operation.
    pub fn apply(&mut self, op: LogOperation) {
        match op {
            LogOperation::Append { value } => {
                self.append(value);
            }
            LogOperation::Read { nth } => {
                if !self.values.is_empty() {
                    self.read_and_verify(nth % self.values.len());
                }
            }
            LogOperation::Reopen => self.reopen(),
        }
    }

    /// Verifies every tracked record and the bounds around them.
    pub fn verify_all(&self) {
        for nth in 0..self.values.len() {
            self.read_and_verify(nth);
        }

        let next = self.initial_offset + self.values.len() as u64;
        assert!(matches!(
            self.log.read(next),
            Err(CoreError::OffsetOutOfRange { offset }) if offset == next
        ));
        assert_eq!(self.log.lowest_offset().expect("Failed to query log"), self.initial_offset);

        let ranges = self.log.segment_ranges();
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "segments must be contiguous");
        }
    }

    /// Returns the number of records appended.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{append_values, numbered_values, small_segments};
    use crate::generators::*;
    use proptest::prelude::*;
    use seglog_storage::ENTRY_WIDTH;

    #[test]
    fn test_integration_harness() {
        let mut harness = IntegrationHarness::new(small_segments(3));

        for value in numbered_values(10) {
            harness.append(value);
        }
        harness.reopen();
        harness.append(b"after reopen".to_vec());

        assert_eq!(harness.len(), 11);
        harness.verify_all();
    }

    #[test]
    fn test_index_boundary_scenario() {
        // three 11-byte records fill a 36-byte index
        let config = Config::new()
            .max_store_bytes(1024)
            .max_index_bytes(ENTRY_WIDTH * 3)
            .initial_offset(16);
        let log = TestLog::with_config(config);

        let offsets = append_values(&*log, &[b"hello world"; 4]);
        assert_eq!(offsets, vec![16, 17, 18, 19]);
        assert_eq!(log.segment_ranges(), vec![16..19, 19..20]);
    }

    #[test]
    fn test_store_boundary_rotation() {
        // each record takes 8 + 8 + 4 = 20 store bytes
        let log = TestLog::with_config(Config::new().max_store_bytes(50));

        append_values(&*log, &[b"abcd"; 7]);
        assert_eq!(log.segment_ranges(), vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn test_truncate_then_reopen() {
        let log = TestLog::with_config(small_segments(4));
        append_values(&*log, &numbered_values(12));

        log.truncate(5).unwrap();
        assert_eq!(log.lowest_offset().unwrap(), 4);

        let log = log.reopen();
        assert_eq!(log.lowest_offset().unwrap(), 4);
        assert_eq!(log.highest_offset().unwrap(), 11);
        for offset in 4..12 {
            assert_eq!(log.read(offset).unwrap().value, format!("value-{offset}").into_bytes());
        }
        assert!(matches!(
            log.read(3),
            Err(CoreError::OffsetOutOfRange { offset: 3 })
        ));
    }

    #[test]
    fn test_reset_then_reopen() {
        let log = TestLog::with_config(small_segments(2).initial_offset(9));
        append_values(&*log, &numbered_values(5));

        log.reset().unwrap();
        append_values(&*log, &[b"fresh"]);

        let log = log.reopen();
        assert_eq!(log.segment_ranges(), vec![9..10]);
        assert_eq!(log.read(9).unwrap().value, b"fresh");
    }

    #[test]
    fn test_shared_log_through_trait_object() {
        let dir = tempfile::tempdir().unwrap();
        let log = seglog_core::Log::open(dir.path(), Config::default()).unwrap();
        let shared: std::sync::Arc<dyn CommitLog> = std::sync::Arc::new(log);

        let offset = shared.append(Record::new(b"via trait".to_vec())).unwrap();
        assert_eq!(shared.read(offset).unwrap().value, b"via trait");
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn reads_return_appended_values(
            config in config_strategy(),
            values in values_strategy(1, 40),
        ) {
            let mut harness = IntegrationHarness::new(config);
            for value in values {
                harness.append(value);
            }
            harness.verify_all();
        }

        #[test]
        fn reopen_preserves_everything(
            config in config_strategy(),
            ops in operation_sequence_strategy(1, 60),
        ) {
            let mut harness = IntegrationHarness::new(config);
            for op in ops {
                harness.apply(op);
            }
            harness.reopen();
            harness.verify_all();
        }

        #[test]
        fn truncate_keeps_everything_above(
            values in values_strategy(1, 30),
            entries in 1u64..5,
            cut in 0usize..30,
        ) {
            let log = TestLog::with_config(small_segments(entries));
            let offsets = append_values(&*log, &values);
            let cut = (cut % values.len()) as u64;

            log.truncate(cut).unwrap();

            let lowest = log.lowest_offset().unwrap();
            prop_assert!(lowest <= cut + 1);
            for &offset in offsets.iter().filter(|&&offset| offset > cut) {
                prop_assert_eq!(&log.read(offset).unwrap().value, &values[offset as usize]);
            }
            for offset in 0..lowest {
                prop_assert!(log.read(offset).is_err());
            }
        }
    }
}

//! Log configuration.

use crate::error::{CoreError, CoreResult};
use seglog_storage::ENTRY_WIDTH;

/// Size limit used when a configured limit is zero.
pub const DEFAULT_MAX_BYTES: u64 = 1024;

/// Limits and starting point for segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Store size at which a segment is maxed (0 = default).
    pub max_store_bytes: u64,

    /// Index size at which a segment is maxed, and the index file's
    /// preallocated capacity (0 = default).
    pub max_index_bytes: u64,

    /// Base offset of the first segment in a fresh log.
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_BYTES,
            max_index_bytes: DEFAULT_MAX_BYTES,
            initial_offset: 0,
        }
    }
}

/// Configuration for opening a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    /// Segment limits.
    pub segment: SegmentConfig,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum store size per segment.
    #[must_use]
    pub const fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Sets the maximum index size per segment.
    #[must_use]
    pub const fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Sets the base offset of the first segment.
    #[must_use]
    pub const fn initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }

    /// Replaces zero size limits with [`DEFAULT_MAX_BYTES`] and checks that
    /// the index can hold at least one entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if `max_index_bytes` is smaller
    /// than one index entry.
    pub fn validated(mut self) -> CoreResult<Self> {
        if self.segment.max_store_bytes == 0 {
            self.segment.max_store_bytes = DEFAULT_MAX_BYTES;
        }
        if self.segment.max_index_bytes == 0 {
            self.segment.max_index_bytes = DEFAULT_MAX_BYTES;
        }

        if self.segment.max_index_bytes < ENTRY_WIDTH {
            return Err(CoreError::invalid_config(format!(
                "max_index_bytes {} is smaller than one index entry ({ENTRY_WIDTH} bytes)",
                self.segment.max_index_bytes
            )));
        }

        Ok(self)
    }
}

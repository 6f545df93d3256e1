//! Error types for SegLog core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SegLog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store or index error.
    #[error("storage error: {0}")]
    Storage(#[from] seglog_storage::StorageError),

    /// I/O error outside a store or index, e.g. listing the log directory.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No segment covers the requested offset.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange {
        /// The requested offset.
        offset: u64,
    },

    /// A stored payload could not be decoded into a record.
    #[error("malformed record: {message}")]
    MalformedRecord {
        /// Description of the problem.
        message: String,
    },

    /// No offset is left to assign after `offset`.
    #[error("offset space exhausted at {offset}")]
    OffsetOverflow {
        /// The last offset that could be assigned.
        offset: u64,
    },

    /// The segment reached its store or index limit.
    #[error("segment {base_offset} is maxed at offset {next_offset}")]
    SegmentMaxed {
        /// Base offset of the segment.
        base_offset: u64,
        /// Next offset the segment would have assigned.
        next_offset: u64,
    },

    /// Segments on disk are inconsistent with each other.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The configuration cannot be used.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The log has been closed.
    #[error("log is closed")]
    Closed,
}

impl CoreError {
    /// Creates an offset out of range error.
    pub fn out_of_range(offset: u64) -> Self {
        Self::OffsetOutOfRange { offset }
    }

    /// Creates a malformed record error.
    pub fn malformed_record(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this error marks the end of an index or store.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_eof())
    }
}

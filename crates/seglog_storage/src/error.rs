//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the store.
    #[error("read beyond end of store: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: u64,
        /// The current logical store size.
        size: u64,
    },

    /// The index is empty or the requested entry was never written.
    #[error("end of index: entry {entry} requested, {entries} entries written")]
    EndOfIndex {
        /// The requested entry number.
        entry: u64,
        /// Number of entries currently written.
        entries: u64,
    },

    /// The index has no room for another entry.
    #[error("index full: {size} of {capacity} bytes used")]
    IndexFull {
        /// Logical index size in bytes.
        size: u64,
        /// Mapped capacity in bytes.
        capacity: u64,
    },

    /// The index capacity cannot hold a single entry.
    #[error("index capacity {capacity} is smaller than one {required}-byte entry")]
    CapacityTooSmall {
        /// Requested capacity in bytes.
        capacity: u64,
        /// Bytes needed for one entry.
        required: u64,
    },

    /// A file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store or index has been closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if this error marks the end of an index or store.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Self::EndOfIndex { .. } | Self::ReadPastEnd { .. } => true,
            Self::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

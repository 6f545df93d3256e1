//! # SegLog Core
//!
//! A segmented, append-only commit log.
//!
//! This crate provides:
//! - [`Record`] and its store encoding
//! - [`Segment`], pairing one store and one index over an offset range
//! - [`Log`], the ordered set of segments with rotation, retention and
//!   recovery
//! - [`CommitLog`], the append/read capability handed to servers
//!
//! ## On-Disk Layout
//!
//! ```text
//! <log_dir>/
//! ├─ <base>.store   # | length (8) | offset (8) | value | ...
//! └─ <base>.index   # | relative_offset (4) | position (8) | ...
//! ```
//!
//! ## Invariants
//!
//! - Offsets are assigned by the log, gapless and strictly increasing
//! - Segment offset ranges never overlap and are ordered by base offset
//! - Only the last segment accepts appends
//! - A closed index file is exactly as long as its written entries

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dir;
mod error;
mod log;
mod reader;
mod record;
mod segment;

pub use config::{Config, SegmentConfig, DEFAULT_MAX_BYTES};
pub use error::{CoreError, CoreResult};
pub use log::Log;
pub use reader::FullReader;
pub use record::Record;
pub use segment::Segment;

use std::sync::Arc;

/// The capabilities a log offers to the layers above it.
///
/// Transport, authentication and wire framing live outside this crate and
/// only need these two operations.
pub trait CommitLog: Send + Sync {
    /// Appends a record and returns the offset assigned to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn append(&self, record: Record) -> CoreResult<u64>;

    /// Reads the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OffsetOutOfRange`] if no segment holds `offset`.
    fn read(&self, offset: u64) -> CoreResult<Record>;
}

impl<T: CommitLog + ?Sized> CommitLog for Arc<T> {
    fn append(&self, record: Record) -> CoreResult<u64> {
        (**self).append(record)
    }

    fn read(&self, offset: u64) -> CoreResult<Record> {
        (**self).read(offset)
    }
}

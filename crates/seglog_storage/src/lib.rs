//! # SegLog Storage
//!
//! On-disk file formats for the SegLog commit log.
//!
//! A segment of the log is persisted as two files:
//!
//! - [`Store`] - payloads framed as `| length (8) | payload |`, appended
//!   through a buffered writer and addressed by byte position
//! - [`Index`] - fixed 12-byte entries `| relative_offset (4) | position (8) |`
//!   in a preallocated, memory-mapped file
//!
//! All integers are big-endian. Neither type knows about records, offsets
//! across segments, or rotation; that lives in `seglog_core`.
//!
//! ## Example
//!
//! ```no_run
//! use seglog_storage::{Index, IndexEntry, Store};
//! use std::path::Path;
//!
//! let store = Store::open(Path::new("0.store")).unwrap();
//! let mut index = Index::open(Path::new("0.index"), 1024).unwrap();
//!
//! let (_, pos) = store.append(b"hello world").unwrap();
//! index.write(0, pos).unwrap();
//!
//! let (_, pos) = index.read(IndexEntry::Last).unwrap();
//! assert_eq!(store.read(pos).unwrap(), b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod index;
mod store;

pub use error::{StorageError, StorageResult};
pub use index::{Index, IndexEntry, ENTRY_WIDTH, OFFSET_WIDTH, POSITION_WIDTH};
pub use store::{Store, LEN_WIDTH};

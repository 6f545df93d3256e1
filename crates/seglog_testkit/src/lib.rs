//! # SegLog Testkit
//!
//! Test utilities for SegLog.
//!
//! This crate provides:
//! - Temporary log fixtures with reopen and crash helpers
//! - Property-based test generators using proptest
//! - Golden byte layouts of the store and index files
//! - Crash recovery harness
//! - An integration harness that checks a log against an in-memory model
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seglog_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_log() {
//!     with_temp_log(|log| {
//!         let offset = log.append(Record::new(b"value".to_vec())).unwrap();
//!         assert_eq!(log.read(offset).unwrap().value, b"value");
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod golden;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::IntegrationHarness;
    pub use crate::stress::*;
    pub use seglog_core::{CommitLog, Config, CoreError, Log, Record};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use golden::*;
pub use integration::IntegrationHarness;
pub use stress::*;

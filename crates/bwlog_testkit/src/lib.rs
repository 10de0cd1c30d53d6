//! # bwlog testkit
//!
//! Test utilities for bwlog.
//!
//! This crate provides:
//! - A temporary log root with a controllable clock and fixed name lookups
//! - Builders for log messages and their argument streams
//! - Property-based generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bwlog_testkit::prelude::*;
//!
//! #[test]
//! fn finds_what_was_written() {
//!     let mut root = TestLogRoot::new();
//!     root.log(1000, "loaded %d spaces", ArgsBuilder::new().int(3).build());
//!     let reader = root.reader();
//!     // ... query
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod args;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::args::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use args::*;
pub use fixtures::*;
pub use generators::*;

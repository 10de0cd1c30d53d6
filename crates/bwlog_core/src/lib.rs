//! # bwlog core
//!
//! Storage and query engine for structured process logs.
//!
//! A log root holds one directory per user. Each user log is a series of
//! segments, and each entry stores a reference into a shared catalog of
//! printf-style format strings plus the raw argument bytes, so messages are
//! rendered only when read.
//!
//! This crate provides:
//! - [`LogRootWriter`], the single process that appends messages
//! - [`LogRootReader`] and [`Query`], for bidirectional, resumable scans
//!   with host, pid, app id, process type, priority and regex filters
//! - The on-disk pieces underneath: format catalog, name catalogs,
//!   component registries, segments
//!
//! ## Example
//!
//! ```rust,no_run
//! use bwlog_core::{LogRootReader, QueryParams};
//!
//! let reader = LogRootReader::open("/var/log/bwlogs")?;
//! for result in reader.query(QueryParams::new(1000).include("error"))?.matches() {
//!     println!("{}", result?);
//! }
//! # Ok::<(), bwlog_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod codec;
mod config;
mod error;
mod types;

pub mod component;
pub mod format;
pub mod names;
pub mod query;
pub mod root;
pub mod segment;
pub mod user_log;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, DEFAULT_SEGMENT_SIZE_MB};
pub use error::{CoreError, CoreResult};
pub use query::{
    DisplayFlags, MatchTarget, Query, QueryBound, QueryItem, QueryParams, QueryPosition,
    QueryResult,
};
pub use root::{LogMessage, LogRootReader, LogRootWriter, UserInfo, WriterEnv};
pub use codec::put_packed_bytes;
pub use types::{Address, Direction, EntryAddress, LogTime, MessagePriority};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Layout version stored in a log root's `version` file.
pub const LOG_FORMAT_VERSION: u32 = 1;

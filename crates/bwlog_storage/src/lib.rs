//! # bwlog storage
//!
//! The lowest-level file abstraction used by the bwlog engine.
//!
//! Backends are **opaque byte stores**: they know nothing about log entries,
//! format catalogs or segments. Everything above this crate owns the
//! interpretation of the bytes.
//!
//! ## Design Principles
//!
//! - Files only grow (`append`), except for the single in-place `write_at`
//!   patch the component registry performs
//! - Readers may observe a file growing underneath them and re-stat it with
//!   [`StorageBackend::refresh_size`]
//! - Backends are `Send + Sync`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing
//! - [`FileBackend`] - OS files, opened read-write or read-only
//!
//! Line-oriented helpers for the small text files of a log root live in
//! [`text`].
//!
//! ## Example
//!
//! ```rust
//! use bwlog_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
pub mod text;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;

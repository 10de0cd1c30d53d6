//! Error types for bwlog core.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in bwlog core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] bwlog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The format string catalog is corrupted or an offset does not name a record.
    #[error("format catalog corruption: {message}")]
    CatalogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A segment entries or args file is corrupted.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A component record is corrupted or missing.
    #[error("component corruption: {message}")]
    ComponentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// An argument stream ended before all tokens were read.
    #[error("argument stream underrun: needed {needed} bytes, {available} available")]
    ArgumentUnderrun {
        /// Bytes the next value needed.
        needed: usize,
        /// Bytes left in the stream.
        available: usize,
    },

    /// A read-only format catalog was asked for text it has never seen.
    #[error("unknown format string: {text:?}")]
    UnknownFormatString {
        /// The format text.
        text: String,
    },

    /// A format string could not be compiled.
    #[error("invalid format string: {message}")]
    InvalidFormatString {
        /// Description of the problem.
        message: String,
    },

    /// Another writer owns the log root.
    #[error("log root locked: {} is held by pid {pid}", path.display())]
    WriterLocked {
        /// Path of the pid file.
        path: PathBuf,
        /// Pid recorded in the file (0 if unreadable).
        pid: u32,
    },

    /// Invalid log root layout or version.
    #[error("invalid log format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// No user log exists for the uid.
    #[error("unknown uid {uid}")]
    UnknownUser {
        /// The requested uid.
        uid: u16,
    },

    /// A host filter names a host the hostname catalog has never seen.
    #[error("unknown host {host:?}")]
    UnknownHost {
        /// The requested host.
        host: String,
    },

    /// A filter regex failed to compile.
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// A query range could not be resolved.
    #[error("invalid query range: {message}")]
    InvalidRange {
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A catalog has no room for another entry.
    #[error("catalog full: {name}")]
    CatalogFull {
        /// Which catalog.
        name: String,
    },

    /// A scan was cancelled by its timeout callback.
    #[error("query aborted by timeout callback")]
    QueryAborted,
}

impl CoreError {
    /// Creates a format catalog corruption error.
    pub fn catalog_corruption(message: impl Into<String>) -> Self {
        Self::CatalogCorruption {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates a component corruption error.
    pub fn component_corruption(message: impl Into<String>) -> Self {
        Self::ComponentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format string error.
    pub fn invalid_format_string(message: impl Into<String>) -> Self {
        Self::InvalidFormatString {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid range error.
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns whether the error only affects a single entry.
    ///
    /// Scans skip entries that fail this way and keep going.
    #[must_use]
    pub fn is_entry_local(&self) -> bool {
        matches!(
            self,
            Self::CatalogCorruption { .. }
                | Self::SegmentCorruption { .. }
                | Self::ComponentCorruption { .. }
                | Self::ArgumentUnderrun { .. }
                | Self::InvalidFormatString { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_local_errors() {
        assert!(CoreError::segment_corruption("short").is_entry_local());
        assert!(CoreError::ArgumentUnderrun {
            needed: 4,
            available: 1
        }
        .is_entry_local());
        assert!(!CoreError::QueryAborted.is_entry_local());
        assert!(!CoreError::UnknownUser { uid: 3 }.is_entry_local());
    }

    #[test]
    fn writer_locked_message() {
        let err = CoreError::WriterLocked {
            path: PathBuf::from("/logs/pid"),
            pid: 42,
        };
        assert_eq!(err.to_string(), "log root locked: /logs/pid is held by pid 42");
    }
}

//! Segments: the rotation unit of a user log.
//!
//! A segment is a pair of files sharing a suffix: `entries.<suffix>` holds
//! fixed-size [`LogEntry`] records and `args.<suffix>` the variable-length
//! argument blobs they point into.

mod entry;
mod reader;
mod suffix;
mod writer;

pub use entry::LogEntry;
pub use reader::SegmentReader;
pub use suffix::{
    args_path, entries_path, make_suffix, suffix_of_entries_file, ARGS_PREFIX, ENTRIES_PREFIX,
};
pub use writer::{Appended, EncodedArgs, SegmentWriter};

//! Segment file naming.

use crate::types::LogTime;
use std::path::{Path, PathBuf};

/// Prefix of entries files.
pub const ENTRIES_PREFIX: &str = "entries.";
/// Prefix of args files.
pub const ARGS_PREFIX: &str = "args.";

const SUFFIX_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Path of the entries file for `suffix`.
#[must_use]
pub fn entries_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("{ENTRIES_PREFIX}{suffix}"))
}

/// Path of the args file for `suffix`.
#[must_use]
pub fn args_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("{ARGS_PREFIX}{suffix}"))
}

/// Returns the suffix of an entries file name.
#[must_use]
pub fn suffix_of_entries_file(name: &str) -> Option<&str> {
    name.strip_prefix(ENTRIES_PREFIX)
        .filter(|s| !s.is_empty() && !s.ends_with(".tmp"))
}

/// Makes an unused suffix for a segment created at `time`.
///
/// The suffix is the local time; `.001`, `.002`, ... are appended while the
/// plain stamp is already taken by another segment in `dir`.
#[must_use]
pub fn make_suffix(dir: &Path, time: LogTime) -> String {
    let base = time.to_local().map_or_else(
        || time.secs.to_string(),
        |local| local.format(SUFFIX_FORMAT).to_string(),
    );

    let taken = |s: &str| entries_path(dir, s).exists() || args_path(dir, s).exists();
    if !taken(&base) {
        return base;
    }
    (1u32..)
        .map(|n| format!("{base}.{n:03}"))
        .find(|s| !taken(s))
        .unwrap_or(base)
}

//! Helpers for the small text files of a log root.
//!
//! `version`, `uid`, `component_names`, `hostnames` and `active_files` are
//! plain text. They are either appended one line at a time or regenerated
//! wholesale with a write-then-rename.

use crate::error::StorageResult;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// Reads all lines of a text file.
///
/// A missing file reads as empty. A trailing partial line (no newline yet,
/// e.g. mid-append by a writer) is returned like any other line.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_lines(path: &Path) -> StorageResult<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        lines.push(line?);
    }
    Ok(lines)
}

/// Reads a file and returns its contents with surrounding whitespace removed.
///
/// Returns `None` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_trimmed(path: &Path) -> StorageResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Appends one line (a newline is added) and flushes.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_line(path: &Path, line: &str) -> StorageResult<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf)?;
    file.flush()?;
    Ok(())
}

/// Replaces a file's contents atomically (temp file, sync, rename).
///
/// # Errors
///
/// Returns an error if any step fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp_path = Path::new(&temp);

    let mut file = File::create(temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    fs::rename(temp_path, path)?;
    Ok(())
}

/// Removes a file, treating "already gone" as success.
///
/// Returns whether a file was removed.
///
/// # Errors
///
/// Returns an error for any failure other than the file not existing.
pub fn remove_if_exists(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

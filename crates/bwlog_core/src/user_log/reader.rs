//! Read access to one user's log directory.

use super::UID_FILE;
use crate::component::{ComponentRegistry, LoggingComponent};
use crate::error::{CoreError, CoreResult};
use crate::segment::{suffix_of_entries_file, LogEntry, SegmentReader};
use crate::types::EntryAddress;
use bwlog_storage::text;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Which end of a user log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremity {
    /// The oldest entry.
    Begin,
    /// The newest entry.
    End,
}

/// A user log opened for reading.
///
/// Segments are kept ordered by the time of their first entry, not by
/// suffix: local-time suffixes are not monotonic across DST changes.
#[derive(Debug)]
pub struct UserLogReader {
    uid: u16,
    username: String,
    path: PathBuf,
    segments: Vec<SegmentReader>,
    components: ComponentRegistry,
}

impl UserLogReader {
    /// Opens the user directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the `uid` file is missing or malformed, or
    /// an I/O error.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let username = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::invalid_format(format!("bad user dir {}", path.display())))?
            .to_string();
        let uid = read_uid(path)?;
        let components = ComponentRegistry::open(&path.join(super::COMPONENTS_FILE), false)?;

        let mut reader = Self {
            uid,
            username,
            path: path.to_path_buf(),
            segments: Vec::new(),
            components,
        };
        reader.reload_files()?;
        Ok(reader)
    }

    /// The user's uid.
    #[must_use]
    pub fn uid(&self) -> u16 {
        self.uid
    }

    /// The user's directory name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The user directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-scans the directory for new, grown and removed segments.
    ///
    /// Returns whether the segment list or any segment's size changed.
    /// Segments that cannot be opened are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn reload_files(&mut self) -> CoreResult<bool> {
        let mut on_disk = BTreeSet::new();
        for dir_entry in fs::read_dir(&self.path)? {
            let dir_entry = dir_entry?;
            if let Some(suffix) = dir_entry
                .file_name()
                .to_str()
                .and_then(suffix_of_entries_file)
            {
                on_disk.insert(suffix.to_string());
            }
        }

        let before = self.segments.len();
        self.segments.retain(|s| on_disk.contains(s.suffix()));
        let mut changed = self.segments.len() != before;
        if changed {
            tracing::debug!(
                user = %self.username,
                removed = before - self.segments.len(),
                "segments vanished"
            );
        }

        for segment in &mut self.segments {
            if segment.is_dirty()? {
                segment.refresh_bounds()?;
                changed = true;
            }
        }

        for suffix in on_disk {
            if self.segments.iter().any(|s| s.suffix() == suffix) {
                continue;
            }
            match SegmentReader::open(&self.path, &suffix) {
                Ok(segment) => {
                    self.segments.push(segment);
                    changed = true;
                }
                Err(e) => {
                    tracing::warn!(
                        user = %self.username,
                        suffix = %suffix,
                        error = %e,
                        "skipping segment"
                    );
                }
            }
        }

        if changed {
            self.segments
                .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        }
        self.components.reload()?;
        Ok(changed)
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment `i` in time order.
    #[must_use]
    pub fn segment(&self, i: usize) -> Option<&SegmentReader> {
        self.segments.get(i)
    }

    /// All segments in time order.
    #[must_use]
    pub fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    /// Index of the segment with `suffix`.
    #[must_use]
    pub fn get_segment_index_from_suffix(&self, suffix: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.suffix() == suffix)
    }

    /// Reads the entry at `address`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if the segment is unknown, or the segment's
    /// read error.
    pub fn get_entry(&self, address: &EntryAddress) -> CoreResult<LogEntry> {
        let index = self
            .get_segment_index_from_suffix(&address.suffix)
            .ok_or_else(|| CoreError::invalid_range(format!("no segment {}", address.suffix)))?;
        self.segments[index].read_entry(address.index)
    }

    /// Address of the oldest or newest entry, if the log has any.
    #[must_use]
    pub fn extremity(&self, which: Extremity) -> Option<EntryAddress> {
        let non_empty = |s: &&SegmentReader| s.num_entries() > 0;
        match which {
            Extremity::Begin => self
                .segments
                .iter()
                .find(non_empty)
                .map(|s| EntryAddress::new(s.suffix(), 0)),
            Extremity::End => self
                .segments
                .iter()
                .rev()
                .find(non_empty)
                .map(|s| EntryAddress::new(s.suffix(), s.num_entries() - 1)),
        }
    }

    /// Looks up a component by id.
    #[must_use]
    pub fn get_component_by_id(&self, id: i32) -> Option<&LoggingComponent> {
        self.components.get_by_id(id)
    }

    /// The user's component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Reloads components, e.g. after an entry names an unknown id.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn reload_components(&mut self) -> CoreResult<usize> {
        self.components.reload()
    }
}

/// Reads the `uid` file of a user directory.
pub(crate) fn read_uid(path: &Path) -> CoreResult<u16> {
    let raw = text::read_trimmed(&path.join(UID_FILE))?.ok_or_else(|| {
        CoreError::invalid_format(format!("{} has no uid file", path.display()))
    })?;
    raw.parse().map_err(|_| {
        CoreError::invalid_format(format!("{}: bad uid {raw:?}", path.display()))
    })
}

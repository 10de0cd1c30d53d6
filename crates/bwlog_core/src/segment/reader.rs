//! Read access to one segment.

use super::entry::LogEntry;
use super::suffix::{args_path, entries_path};
use crate::error::{CoreError, CoreResult};
use crate::types::{Direction, LogTime};
use bwlog_storage::{FileBackend, StorageBackend};
use std::path::Path;

const ENTRY_SIZE: u64 = LogEntry::SIZE as u64;

/// A segment opened for reading.
///
/// The writer may still be appending. [`SegmentReader::is_dirty`] tells
/// whether the entries file grew since the bounds were last computed.
pub struct SegmentReader {
    suffix: String,
    entries: Box<dyn StorageBackend>,
    args: Box<dyn StorageBackend>,
    num_entries: u32,
    args_size: u64,
    start: Option<LogTime>,
    end: Option<LogTime>,
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("suffix", &self.suffix)
            .field("num_entries", &self.num_entries)
            .field("args_size", &self.args_size)
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

impl SegmentReader {
    /// Opens the entries and args files for `suffix` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file is missing or unreadable.
    pub fn open(dir: &Path, suffix: &str) -> CoreResult<Self> {
        let entries = FileBackend::open_read_only(&entries_path(dir, suffix))?;
        let args = FileBackend::open_read_only(&args_path(dir, suffix))?;
        Self::with_backends(suffix, Box::new(entries), Box::new(args))
    }

    /// Opens a segment over existing backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds cannot be read.
    pub fn with_backends(
        suffix: &str,
        entries: Box<dyn StorageBackend>,
        args: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let mut reader = Self {
            suffix: suffix.to_string(),
            entries,
            args,
            num_entries: 0,
            args_size: 0,
            start: None,
            end: None,
        };
        reader.refresh_bounds()?;
        Ok(reader)
    }

    /// The segment suffix.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Number of complete entries seen at the last refresh.
    #[must_use]
    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    /// Size of the args file at the last refresh.
    #[must_use]
    pub fn args_size(&self) -> u64 {
        self.args_size
    }

    /// Time of the first entry, if any.
    #[must_use]
    pub fn start(&self) -> Option<LogTime> {
        self.start
    }

    /// Time of the last entry, if any.
    #[must_use]
    pub fn end(&self) -> Option<LogTime> {
        self.end
    }

    /// Key segments are ordered by: start time, empty segments last.
    #[must_use]
    pub fn sort_key(&self) -> (LogTime, &str) {
        (self.start.unwrap_or(LogTime::END), &self.suffix)
    }

    /// Returns whether the entries file grew since the last refresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    pub fn is_dirty(&self) -> CoreResult<bool> {
        let size = self.entries.refresh_size()?;
        Ok(size / ENTRY_SIZE != u64::from(self.num_entries))
    }

    /// Recounts entries and re-reads the first and last entry times.
    ///
    /// A partially written trailing entry is not counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be read.
    pub fn refresh_bounds(&mut self) -> CoreResult<()> {
        let size = self.entries.refresh_size()?;
        let count = u32::try_from(size / ENTRY_SIZE).map_err(|_| {
            CoreError::segment_corruption(format!("segment {} too large", self.suffix))
        })?;
        self.args_size = self.args.refresh_size()?;
        self.num_entries = count;

        if count == 0 {
            self.start = None;
            self.end = None;
        } else {
            self.start = Some(self.time_at(0)?);
            self.end = Some(self.time_at(count - 1)?);
        }
        tracing::trace!(suffix = %self.suffix, entries = count, "segment bounds refreshed");
        Ok(())
    }

    fn check_index(&self, n: u32) -> CoreResult<()> {
        if n >= self.num_entries {
            return Err(CoreError::invalid_operation(format!(
                "entry {n} past end of segment {} ({} entries)",
                self.suffix, self.num_entries
            )));
        }
        Ok(())
    }

    /// Reads entry `n`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an index past the end, or
    /// `SegmentCorruption` if the record is malformed.
    pub fn read_entry(&self, n: u32) -> CoreResult<LogEntry> {
        self.check_index(n)?;
        let data = self
            .entries
            .read_at(u64::from(n) * ENTRY_SIZE, LogEntry::SIZE)?;
        LogEntry::decode(&data)
    }

    /// Reads the time of entry `n`.
    ///
    /// # Errors
    ///
    /// Same as [`SegmentReader::read_entry`].
    pub fn time_at(&self, n: u32) -> CoreResult<LogTime> {
        self.check_index(n)?;
        let data = self.entries.read_at(u64::from(n) * ENTRY_SIZE, 10)?;
        LogEntry::decode_time(&data)
    }

    /// Reads the args blob of `entry`.
    ///
    /// # Errors
    ///
    /// Returns `SegmentCorruption` if the blob lies outside the args file.
    pub fn read_args(&self, entry: &LogEntry) -> CoreResult<Vec<u8>> {
        let end = u64::from(entry.args_offset) + u64::from(entry.args_len);
        if end > self.args_size && end > self.args.refresh_size()? {
            return Err(CoreError::segment_corruption(format!(
                "args {}..{end} outside args.{}",
                entry.args_offset, self.suffix
            )));
        }
        Ok(self
            .args
            .read_at(u64::from(entry.args_offset), usize::from(entry.args_len))?)
    }

    /// Binary search for the boundary entry nearest `time`.
    ///
    /// Forwards: the smallest index whose time is `>= time`. Backwards: the
    /// largest index whose time is `<= time`. `None` if no entry qualifies.
    /// Entry times are assumed non-decreasing.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry cannot be read.
    pub fn find_entry_number(
        &self,
        time: LogTime,
        direction: Direction,
    ) -> CoreResult<Option<u32>> {
        // First index whose time fails the predicate
        let partition = |before: &dyn Fn(LogTime) -> bool| -> CoreResult<u32> {
            let (mut lo, mut hi) = (0u32, self.num_entries);
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                if before(self.time_at(mid)?) {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            Ok(lo)
        };

        match direction {
            Direction::Forwards => {
                let idx = partition(&|t| t < time)?;
                Ok((idx < self.num_entries).then_some(idx))
            }
            Direction::Backwards => {
                let idx = partition(&|t| t <= time)?;
                Ok(idx.checked_sub(1))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwlog_storage::InMemoryBackend;
    use proptest::prelude::*;

    fn segment(times: &[LogTime]) -> SegmentReader {
        let mut entries = Vec::new();
        for (i, t) in times.iter().enumerate() {
            let entry = LogEntry {
                time: *t,
                component_id: 0,
                priority: 2,
                string_offset: 0,
                args_offset: i as u32,
                args_len: 1,
            };
            entries.extend_from_slice(&entry.encode());
        }
        let args = (0..times.len()).map(|i| i as u8).collect();
        SegmentReader::with_backends(
            "test",
            Box::new(InMemoryBackend::with_data(entries)),
            Box::new(InMemoryBackend::with_data(args)),
        )
        .unwrap()
    }

    fn secs(s: &[i64]) -> Vec<LogTime> {
        s.iter().map(|&s| LogTime::new(s, 0)).collect()
    }

    #[test]
    fn bounds_and_entries() {
        let reader = segment(&secs(&[10, 11, 12]));
        assert_eq!(reader.num_entries(), 3);
        assert_eq!(reader.start(), Some(LogTime::new(10, 0)));
        assert_eq!(reader.end(), Some(LogTime::new(12, 0)));

        let entry = reader.read_entry(2).unwrap();
        assert_eq!(reader.read_args(&entry).unwrap(), vec![2]);
        assert!(reader.read_entry(3).is_err());
    }

    #[test]
    fn empty_segment() {
        let reader = segment(&[]);
        assert_eq!(reader.start(), None);
        assert_eq!(reader.sort_key().0, LogTime::END);
        assert_eq!(
            reader
                .find_entry_number(LogTime::BEGIN, Direction::Forwards)
                .unwrap(),
            None
        );
    }

    #[test]
    fn search_boundaries() {
        let reader = segment(&secs(&[10, 20, 20, 30]));
        let fwd = |s| {
            reader
                .find_entry_number(LogTime::new(s, 0), Direction::Forwards)
                .unwrap()
        };
        let back = |s| {
            reader
                .find_entry_number(LogTime::new(s, 0), Direction::Backwards)
                .unwrap()
        };

        assert_eq!(fwd(5), Some(0));
        assert_eq!(fwd(20), Some(1));
        assert_eq!(fwd(21), Some(3));
        assert_eq!(fwd(31), None);

        assert_eq!(back(5), None);
        assert_eq!(back(20), Some(2));
        assert_eq!(back(29), Some(2));
        assert_eq!(back(99), Some(3));
    }

    #[test]
    fn dirty_after_growth() {
        let entries = InMemoryBackend::new();
        let mut reader = SegmentReader::with_backends(
            "grow",
            Box::new(entries.clone()),
            Box::new(InMemoryBackend::new()),
        )
        .unwrap();
        assert!(!reader.is_dirty().unwrap());

        let mut writer = entries;
        let entry = LogEntry {
            time: LogTime::new(1, 0),
            component_id: 0,
            priority: 0,
            string_offset: 0,
            args_offset: 0,
            args_len: 0,
        };
        writer.append(&entry.encode()).unwrap();
        // Half an entry is not counted
        writer.append(&entry.encode()[..10]).unwrap();

        assert!(reader.is_dirty().unwrap());
        reader.refresh_bounds().unwrap();
        assert_eq!(reader.num_entries(), 1);
        assert!(!reader.is_dirty().unwrap());
    }

    #[test]
    fn args_outside_file_is_corruption() {
        let reader = segment(&secs(&[1]));
        let mut entry = reader.read_entry(0).unwrap();
        entry.args_len = 50;
        assert!(matches!(
            reader.read_args(&entry),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }

    proptest! {
        #[test]
        fn search_matches_linear_scan(
            mut raw in prop::collection::vec(0i64..50, 0..40),
            seconds in -2i64..55,
        ) {
            raw.sort_unstable();
            let times = secs(&raw);
            let reader = segment(&times);
            let t = LogTime::new(seconds.max(0), 0);

            let expected_fwd = times.iter().position(|x| *x >= t).map(|i| i as u32);
            let expected_back = times.iter().rposition(|x| *x <= t).map(|i| i as u32);

            let fwd = reader.find_entry_number(t, Direction::Forwards).unwrap();
            let back = reader.find_entry_number(t, Direction::Backwards).unwrap();
            prop_assert_eq!(fwd, expected_fwd);
            prop_assert_eq!(back, expected_back);
        }
    }
}

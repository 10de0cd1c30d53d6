//! The active, writable segment of a user log.

use super::entry::LogEntry;
use super::suffix::{args_path, entries_path};
use crate::component::ComponentRegistry;
use crate::error::{CoreError, CoreResult};
use crate::format::{interpolate, BlobEncoder, DualVisitor, FormatString};
use crate::types::{EntryAddress, LogTime};
use bwlog_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};

/// Result of appending one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Where the entry landed.
    pub address: EntryAddress,
    /// The rendered message, if rendering was requested.
    pub rendered: Option<String>,
}

/// A message's args, checked against its format and re-encoded.
///
/// Encoding happens before anything is written, so a malformed message
/// never touches the segment files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedArgs {
    string_offset: u32,
    blob: Vec<u8>,
    args_len: u16,
    rendered: Option<String>,
}

impl EncodedArgs {
    /// Decodes `args` against `format` (widening old protocol values) into
    /// a canonical blob, rendering the message too if `render` is set.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentUnderrun` if `args` does not match `format`, or
    /// `InvalidOperation` if the blob is too large for one entry.
    pub fn encode(
        format: &FormatString,
        args: &[u8],
        version: u8,
        render: bool,
    ) -> CoreResult<Self> {
        let (blob, rendered) = if render {
            let mut dual = DualVisitor::default();
            interpolate(format, args, version, &mut dual)?;
            (dual.encoder.into_bytes(), Some(dual.renderer.into_string()))
        } else {
            let mut encoder = BlobEncoder::new();
            interpolate(format, args, version, &mut encoder)?;
            (encoder.into_bytes(), None)
        };

        let args_len = u16::try_from(blob.len()).map_err(|_| {
            CoreError::invalid_operation(format!("args blob of {} bytes too large", blob.len()))
        })?;
        Ok(Self {
            string_offset: format.offset,
            blob,
            args_len,
            rendered,
        })
    }

    /// The canonical blob.
    #[must_use]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

/// A segment being appended to.
///
/// Every write is flushed before the next one starts; a crash loses at
/// most the entry in flight.
pub struct SegmentWriter {
    suffix: String,
    entries: Box<dyn StorageBackend>,
    args: Box<dyn StorageBackend>,
    num_entries: u32,
    args_size: u64,
}

impl std::fmt::Debug for SegmentWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentWriter")
            .field("suffix", &self.suffix)
            .field("num_entries", &self.num_entries)
            .field("args_size", &self.args_size)
            .finish()
    }
}

impl SegmentWriter {
    /// Creates the entries and args files for `suffix` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be created.
    pub fn create(dir: &Path, suffix: &str) -> CoreResult<Self> {
        let entries = FileBackend::open(&entries_path(dir, suffix))?;
        let args = FileBackend::open(&args_path(dir, suffix))?;
        tracing::info!(dir = %dir.display(), suffix, "created segment");
        Self::with_backends(suffix, Box::new(entries), Box::new(args))
    }

    /// Wraps existing backends. Existing content counts toward the budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sizes cannot be read.
    pub fn with_backends(
        suffix: &str,
        entries: Box<dyn StorageBackend>,
        args: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let num_entries = u32::try_from(entries.size()? / LogEntry::SIZE as u64)
            .map_err(|_| CoreError::segment_corruption("entries file too large"))?;
        let args_size = args.size()?;
        Ok(Self {
            suffix: suffix.to_string(),
            entries,
            args,
            num_entries,
            args_size,
        })
    }

    /// The segment suffix.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Entries written so far.
    #[must_use]
    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    /// Bytes used by entries plus args.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        u64::from(self.num_entries) * LogEntry::SIZE as u64 + self.args_size
    }

    /// Returns whether the segment has reached `max_bytes`.
    #[must_use]
    pub fn is_full(&self, max_bytes: u64) -> bool {
        self.total_size() >= max_bytes
    }

    /// The names of this segment's files, relative to the user directory.
    #[must_use]
    pub fn file_names(&self) -> (String, String) {
        (
            format!("{}{}", super::suffix::ENTRIES_PREFIX, self.suffix),
            format!("{}{}", super::suffix::ARGS_PREFIX, self.suffix),
        )
    }

    /// Paths of this segment's files under `dir`.
    #[must_use]
    pub fn file_paths(&self, dir: &Path) -> (PathBuf, PathBuf) {
        (entries_path(dir, &self.suffix), args_path(dir, &self.suffix))
    }

    /// Appends one message whose args were already encoded.
    ///
    /// If this is the component's first entry, its record is written too.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the args file has outgrown the entry's
    /// offset field, or a storage error.
    pub fn append(
        &mut self,
        components: &mut ComponentRegistry,
        component_id: i32,
        time: LogTime,
        priority: u8,
        args: EncodedArgs,
    ) -> CoreResult<Appended> {
        let args_offset = u32::try_from(self.args_size)
            .map_err(|_| CoreError::invalid_operation("args file offset overflow"))?;

        if !args.blob.is_empty() {
            self.args.append(&args.blob)?;
            self.args.flush()?;
            self.args_size += args.blob.len() as u64;
        }

        let entry = LogEntry {
            time,
            component_id,
            priority,
            string_offset: args.string_offset,
            args_offset,
            args_len: args.args_len,
        };
        self.entries.append(&entry.encode())?;
        self.entries.flush()?;

        let address = EntryAddress::new(self.suffix.clone(), self.num_entries);
        self.num_entries += 1;

        if !components.is_written(component_id) {
            components.write_first_entry(component_id, address.clone())?;
        }

        Ok(Appended {
            address,
            rendered: args.rendered,
        })
    }

    /// Syncs both files to disk; the segment takes no more entries.
    ///
    /// # Errors
    ///
    /// Returns a storage error if either sync fails.
    pub fn close(mut self) -> CoreResult<()> {
        self.entries.sync()?;
        self.args.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::put_packed_bytes;
    use crate::component::ComponentIdentity;
    use crate::segment::SegmentReader;
    use crate::types::Address;
    use bwlog_storage::{InMemoryBackend, StorageBackend, StorageResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts `sync` calls on an in-memory store.
    struct Syncs {
        inner: InMemoryBackend,
        count: Arc<AtomicUsize>,
    }

    impl StorageBackend for Syncs {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }
        fn write_at(&mut self, offset: u64, data: &[u8]) -> StorageResult<()> {
            self.inner.write_at(offset, data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            self.inner.flush()
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn refresh_size(&self) -> StorageResult<u64> {
            self.inner.refresh_size()
        }
        fn sync(&mut self) -> StorageResult<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.inner.sync()
        }
    }

    struct Fixture {
        writer: SegmentWriter,
        entries: InMemoryBackend,
        args: InMemoryBackend,
        components: ComponentRegistry,
        component_id: i32,
    }

    fn fixture() -> Fixture {
        let entries = InMemoryBackend::new();
        let args = InMemoryBackend::new();
        let writer =
            SegmentWriter::with_backends("sfx", Box::new(entries.clone()), Box::new(args.clone()))
                .unwrap();
        let mut components =
            ComponentRegistry::with_backend(Box::new(InMemoryBackend::new()), true).unwrap();
        let component_id = components
            .get_or_create(&ComponentIdentity {
                address: Address::new(1, 2),
                version: 7,
                uid: 0,
                pid: 1,
                type_id: 0,
            })
            .unwrap();
        Fixture {
            writer,
            entries,
            args,
            components,
            component_id,
        }
    }

    fn hello(name: &str) -> Vec<u8> {
        let mut args = Vec::new();
        put_packed_bytes(&mut args, name.as_bytes());
        args
    }

    fn encode(format: &str, args: &[u8], render: bool) -> CoreResult<EncodedArgs> {
        let format = FormatString::parse(format).unwrap();
        EncodedArgs::encode(&format, args, 7, render)
    }

    #[test]
    fn append_writes_args_then_entry() {
        let mut f = fixture();
        let (id, t0, t1) = (f.component_id, LogTime::new(10, 0), LogTime::new(10, 500));

        let args = encode("hello %s", &hello("a"), true).unwrap();
        let first = f.writer.append(&mut f.components, id, t0, 2, args).unwrap();
        let args = encode("hello %s", &hello("bb"), false).unwrap();
        let second = f.writer.append(&mut f.components, id, t1, 2, args).unwrap();

        assert_eq!(first.address, EntryAddress::new("sfx", 0));
        assert_eq!(first.rendered.as_deref(), Some("hello a"));
        assert_eq!(second.address.index, 1);
        assert_eq!(second.rendered, None);
        assert_eq!(f.writer.total_size(), 2 * 25 + 2 + 3);

        let reader =
            SegmentReader::with_backends("sfx", Box::new(f.entries), Box::new(f.args)).unwrap();
        let entry = reader.read_entry(1).unwrap();
        assert_eq!(entry.args_offset, 2);
        assert_eq!(reader.read_args(&entry).unwrap(), hello("bb"));

        let component = f.components.get_by_id(f.component_id).unwrap();
        assert_eq!(component.first_entry, Some(EntryAddress::new("sfx", 0)));
    }

    #[test]
    fn underrun_is_rejected_before_writing() {
        let result = encode("%d and %d", &1i32.to_le_bytes(), false);
        assert!(matches!(result, Err(CoreError::ArgumentUnderrun { .. })));

        let both = [1i32.to_le_bytes(), 2i32.to_le_bytes()].concat();
        assert_eq!(encode("%d and %d", &both, false).unwrap().blob().len(), 8);
    }

    #[test]
    fn fullness_threshold() {
        let mut f = fixture();
        let (id, t) = (f.component_id, LogTime::new(1, 0));
        assert!(!f.writer.is_full(50));
        let args = encode("fixed", &[], false).unwrap();
        f.writer.append(&mut f.components, id, t, 0, args.clone()).unwrap();
        assert!(!f.writer.is_full(50));
        f.writer.append(&mut f.components, id, t, 0, args).unwrap();
        assert!(f.writer.is_full(50));
        let names = ("entries.sfx".to_string(), "args.sfx".to_string());
        assert_eq!(f.writer.file_names(), names);
    }

    #[test]
    fn close_syncs_both_files() {
        let count = Arc::new(AtomicUsize::new(0));
        let backend = || {
            Box::new(Syncs {
                inner: InMemoryBackend::new(),
                count: Arc::clone(&count),
            })
        };
        let writer = SegmentWriter::with_backends("sfx", backend(), backend()).unwrap();
        writer.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}

//! Write access to one user's log directory.

use super::{reader::read_uid, COMPONENTS_FILE, UID_FILE};
use crate::component::{ComponentIdentity, ComponentRegistry, LoggingComponent};
use crate::error::{CoreError, CoreResult};
use crate::format::FormatString;
use crate::root::ActiveFiles;
use crate::segment::{make_suffix, Appended, EncodedArgs, SegmentWriter};
use crate::types::{Address, LogTime};
use bwlog_storage::text;
use std::fs;
use std::path::{Path, PathBuf};

/// One message as handed to a user log.
#[derive(Debug, Clone, Copy)]
pub struct EntryInput<'a> {
    /// Sender identity.
    pub identity: &'a ComponentIdentity,
    /// Time to stamp.
    pub time: LogTime,
    /// Raw priority.
    pub priority: u8,
    /// Resolved format string.
    pub format: &'a FormatString,
    /// Wire argument stream.
    pub args: &'a [u8],
    /// Whether to return the rendered message.
    pub render: bool,
}

/// A user log opened for writing.
///
/// Holds at most one open segment. The first message after open or after a
/// roll starts a new one.
#[derive(Debug)]
pub struct UserLogWriter {
    uid: u16,
    username: String,
    path: PathBuf,
    components: ComponentRegistry,
    active: Option<SegmentWriter>,
    max_segment_size: u64,
}

impl UserLogWriter {
    /// Opens (creating if needed) the directory for `username` under `root`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the directory belongs to a different uid,
    /// or an I/O error.
    pub fn open(root: &Path, uid: u16, username: &str, max_segment_size: u64) -> CoreResult<Self> {
        let path = root.join(username);
        fs::create_dir_all(&path)?;

        let uid_path = path.join(UID_FILE);
        if uid_path.exists() {
            let existing = read_uid(&path)?;
            if existing != uid {
                return Err(CoreError::invalid_format(format!(
                    "{} belongs to uid {existing}, not {uid}",
                    path.display()
                )));
            }
        } else {
            text::write_atomic(&uid_path, format!("{uid}\n").as_bytes())?;
        }

        let components = ComponentRegistry::open(&path.join(COMPONENTS_FILE), true)?;
        tracing::debug!(uid, username, components = components.len(), "opened user log");

        Ok(Self {
            uid,
            username: username.to_string(),
            path,
            components,
            active: None,
            max_segment_size,
        })
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

    /// The open segment, if any.
    #[must_use]
    pub fn active_segment(&self) -> Option<&SegmentWriter> {
        self.active.as_ref()
    }

    /// The user's component registry.
    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Returns whether the next entry needs a new segment.
    #[must_use]
    pub fn needs_new_segment(&self) -> bool {
        self.active
            .as_ref()
            .map_or(true, |s| s.is_full(self.max_segment_size))
    }

    /// Appends one entry, starting a new segment first if needed.
    ///
    /// The args are checked against the format before anything else, so a
    /// rejected message creates no segment and no component. Starting a
    /// segment deletes the active files marker, creates the files, then
    /// rewrites the marker naming them.
    ///
    /// # Errors
    ///
    /// Returns `ArgumentUnderrun` if the args do not match the format, or
    /// an error if the component, segment or marker cannot be written.
    pub fn add_entry(
        &mut self,
        input: EntryInput<'_>,
        active_files: &mut ActiveFiles,
    ) -> CoreResult<Appended> {
        let version = input.identity.version;
        let args = EncodedArgs::encode(input.format, input.args, version, input.render)?;
        let component_id = self.components.get_or_create(input.identity)?;

        if self.needs_new_segment() {
            self.start_segment(input.time, active_files)?;
        }
        let Some(segment) = self.active.as_mut() else {
            return Err(CoreError::invalid_operation("no active segment"));
        };

        segment.append(
            &mut self.components,
            component_id,
            input.time,
            input.priority,
            args,
        )
    }

    fn start_segment(&mut self, time: LogTime, active_files: &mut ActiveFiles) -> CoreResult<()> {
        active_files.delete_file()?;

        if let Some(old) = self.active.take() {
            self.close_segment(old, "segment full");
        }
        let suffix = make_suffix(&self.path, time);
        let segment = SegmentWriter::create(&self.path, &suffix)?;
        let (entries, args) = segment.file_names();
        self.active = Some(segment);

        active_files.set(&self.username, entries, args);
        active_files.update()
    }

    fn close_segment(&self, segment: SegmentWriter, reason: &'static str) {
        let suffix = segment.suffix().to_string();
        let size = segment.total_size();
        if let Err(e) = segment.close() {
            tracing::warn!(
                user = %self.username,
                suffix = %suffix,
                error = %e,
                "failed to sync closed segment"
            );
        }
        tracing::info!(user = %self.username, suffix = %suffix, size, "{reason}");
    }

    /// Closes the open segment; the next entry starts a new one.
    ///
    /// Returns whether a segment was open.
    pub fn roll_active_segment(&mut self) -> bool {
        match self.active.take() {
            Some(segment) => {
                self.close_segment(segment, "rolled segment");
                true
            }
            None => false,
        }
    }

    /// Returns the current component at `address`.
    #[must_use]
    pub fn find_component(&self, address: &Address) -> Option<&LoggingComponent> {
        self.components.get_by_address(address)
    }

    /// Forgets the component at `address`.
    pub fn remove_component(&mut self, address: &Address) -> bool {
        self.components.erase(address)
    }

    /// Sets the app instance id of the component at `address`.
    ///
    /// Returns whether this user had such a component.
    ///
    /// # Errors
    ///
    /// Returns an error if the on-disk patch fails.
    pub fn set_app_instance_id(&mut self, address: &Address, app_id: i32) -> CoreResult<bool> {
        let Some(id) = self.components.get_by_address(address).map(|c| c.id) else {
            return Ok(false);
        };
        self.components.patch_app_instance_id(id, app_id)?;
        Ok(true)
    }
}

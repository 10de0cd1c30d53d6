//! The single writer of a log root.

use super::active_files::ActiveFiles;
use super::catalogs::Catalogs;
use super::dir::{LogRootDir, PidLock};
use super::message::LogMessage;
use crate::clock::{Clock, SystemClock};
use crate::component::ComponentIdentity;
use crate::config::Config;
use crate::error::CoreResult;
use crate::format::CatalogMode;
use crate::names::{HostResolver, HostsFileResolver};
use crate::query::QueryResult;
use crate::segment::Appended;
use crate::types::Address;
use crate::user_log::{
    read_uid, resolve_username, EntryInput, PasswdResolver, UserLogWriter, UsernameResolver,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Pluggable lookups used by a writer.
pub struct WriterEnv {
    /// Stamps entries.
    pub clock: Arc<dyn Clock>,
    /// Names sender addresses on first sight.
    pub hosts: Box<dyn HostResolver>,
    /// Names user directories.
    pub users: Box<dyn UsernameResolver>,
}

impl Default for WriterEnv {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            hosts: Box::new(HostsFileResolver::default()),
            users: Box::new(PasswdResolver::default()),
        }
    }
}

impl std::fmt::Debug for WriterEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterEnv").finish_non_exhaustive()
    }
}

/// Appends messages to a log root.
///
/// Only one writer may own a root at a time; the `pid` file enforces this.
/// Readers may run concurrently in other processes.
///
/// # Example
///
/// ```rust,no_run
/// use bwlog_core::{Address, LogMessage, LogRootWriter};
///
/// let mut writer = LogRootWriter::open("/var/log/bwlogs")?;
/// writer.add_log_message(&LogMessage {
///     address: Address::new(0x7f00_0001, 20000),
///     uid: 1000,
///     pid: 4242,
///     version: 7,
///     component_name: "cellapp".into(),
///     priority: 2,
///     format: "loaded %d spaces\n".into(),
///     args: 3i32.to_le_bytes().to_vec(),
/// })?;
/// # Ok::<(), bwlog_core::CoreError>(())
/// ```
#[derive(Debug)]
pub struct LogRootWriter {
    dir: LogRootDir,
    config: Config,
    env: WriterEnv,
    catalogs: Arc<Catalogs>,
    users: HashMap<u16, UserLogWriter>,
    usernames: HashMap<u16, String>,
    active_files: ActiveFiles,
    pid_lock: PidLock,
}

impl LogRootWriter {
    /// Opens the root at `path` with default configuration.
    ///
    /// # Errors
    ///
    /// See [`LogRootWriter::open_with`].
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the root at `path` with custom configuration.
    ///
    /// # Errors
    ///
    /// See [`LogRootWriter::open_with`].
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> CoreResult<Self> {
        Self::open_with(path, config, WriterEnv::default())
    }

    /// Opens the root at `path` with custom configuration and lookups.
    ///
    /// Takes the pid lock, checks or writes the version file, opens the
    /// catalogs and every existing user log, and writes an empty active
    /// files marker.
    ///
    /// # Errors
    ///
    /// Returns `WriterLocked` if another writer owns the root,
    /// `InvalidFormat` on a version mismatch, or an I/O error.
    pub fn open_with<P: AsRef<Path>>(path: P, config: Config, env: WriterEnv) -> CoreResult<Self> {
        let dir = LogRootDir::open(path.as_ref(), config.create_if_missing)?;
        let pid_lock = PidLock::acquire(&dir)?;
        dir.check_version(config.format_version, true)?;
        let catalogs = Arc::new(Catalogs::open(&dir, CatalogMode::Append)?);

        let mut users = HashMap::new();
        let mut usernames = HashMap::new();
        for user_dir in dir.user_dirs()? {
            let Some(name) = user_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let uid = match read_uid(&user_dir) {
                Ok(uid) => uid,
                Err(e) => {
                    tracing::warn!(
                        dir = %user_dir.display(),
                        error = %e,
                        "skipping user directory"
                    );
                    continue;
                }
            };
            let user = UserLogWriter::open(dir.path(), uid, name, config.max_segment_size)?;
            usernames.insert(uid, name.to_string());
            users.insert(uid, user);
        }

        let active_files = ActiveFiles::new(dir.path());
        active_files.update()?;

        tracing::info!(
            path = %dir.path().display(),
            users = users.len(),
            formats = catalogs.formats().len(),
            "opened log root for writing"
        );

        Ok(Self {
            dir,
            config,
            env,
            catalogs,
            users,
            usernames,
            active_files,
            pid_lock,
        })
    }

    /// The root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The root's catalogs.
    #[must_use]
    pub fn catalogs(&self) -> &Arc<Catalogs> {
        &self.catalogs
    }

    /// The open log of `uid`, if any.
    #[must_use]
    pub fn user(&self, uid: u16) -> Option<&UserLogWriter> {
        self.users.get(&uid)
    }

    /// Stores one message.
    ///
    /// Registers its hostname, process type and format string as needed,
    /// opens the user's log on first sight, and appends the entry. With
    /// `write_to_stdout` the rendered line is also printed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormatString` or `ArgumentUnderrun` if the message is
    /// malformed (nothing is appended), `CatalogFull` if the process type
    /// catalog is full, or an I/O error.
    pub fn add_log_message(&mut self, message: &LogMessage) -> CoreResult<Appended> {
        let host = self
            .catalogs
            .hostname(message.address.ip, self.env.hosts.as_ref())?;
        let type_id = self.catalogs.component_type_id(&message.component_name)?;
        let format = self.catalogs.resolve_format(&message.format)?;

        let user = match self.users.entry(message.uid) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let name = self
                    .usernames
                    .entry(message.uid)
                    .or_insert_with(|| resolve_username(self.env.users.as_ref(), message.uid));
                tracing::info!(uid = message.uid, username = %name, "new user log");
                e.insert(UserLogWriter::open(
                    self.dir.path(),
                    message.uid,
                    name.as_str(),
                    self.config.max_segment_size,
                )?)
            }
        };

        let identity = ComponentIdentity {
            address: message.address,
            version: message.version,
            uid: message.uid,
            pid: message.pid,
            type_id,
        };
        let time = self.env.clock.now();
        let appended = user.add_entry(
            EntryInput {
                identity: &identity,
                time,
                priority: message.priority,
                format: &format,
                args: &message.args,
                render: self.config.write_to_stdout,
            },
            &mut self.active_files,
        )?;

        if let Some(rendered) = &appended.rendered {
            let app_id = user.find_component(&message.address).map_or(0, |c| c.app_id);
            let line = QueryResult {
                time,
                host,
                username: user.username().to_string(),
                pid: message.pid,
                app_id,
                component: message.component_name.clone(),
                priority: message.priority,
                message: rendered.clone(),
                address: appended.address.clone(),
                string_offset: format.offset,
            };
            println!("{line}");
        }
        Ok(appended)
    }

    /// Closes every user's active segment.
    ///
    /// User logs are reopened on their next message, so log rotation tools
    /// may move finished segments away in between.
    ///
    /// # Errors
    ///
    /// Returns an error if the active files marker cannot be rewritten.
    pub fn roll(&mut self) -> CoreResult<()> {
        let rolled = self
            .users
            .values_mut()
            .map(UserLogWriter::roll_active_segment)
            .filter(|&rolled| rolled)
            .count();
        self.users.clear();
        self.active_files.clear();
        self.active_files.update()?;
        tracing::info!(rolled, "rolled all user logs");
        Ok(())
    }

    /// Sets the app instance id of the component at `address`.
    ///
    /// Returns whether any user log knew the component.
    ///
    /// # Errors
    ///
    /// Returns an error if the on-disk patch fails.
    pub fn set_app_instance_id(&mut self, address: &Address, app_id: i32) -> CoreResult<bool> {
        for user in self.users.values_mut() {
            if user.set_app_instance_id(address, app_id)? {
                tracing::debug!(%address, app_id, "set app instance id");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Forgets the component at `address`; its next message makes a new
    /// one.
    ///
    /// Returns whether any user log knew the component.
    pub fn stop_logging_from_component(&mut self, address: &Address) -> bool {
        self.users
            .values_mut()
            .any(|user| user.remove_component(address))
    }

    /// Rewrites the active files marker from the open segments.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn update_active_files(&mut self) -> CoreResult<()> {
        self.active_files.clear();
        for user in self.users.values() {
            if let Some(segment) = user.active_segment() {
                let (entries, args) = segment.file_names();
                self.active_files.set(user.username(), entries, args);
            }
        }
        self.active_files.update()
    }

    /// Removes the active files marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete_active_files(&self) -> CoreResult<()> {
        self.active_files.delete_file()
    }
}

impl Drop for LogRootWriter {
    fn drop(&mut self) {
        if self.pid_lock.is_owned() {
            if let Err(e) = self.delete_active_files() {
                tracing::warn!(
                    path = %self.dir.path().display(),
                    error = %e,
                    "failed to remove active files marker"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CoreError;
    use crate::root::ACTIVE_FILES;
    use crate::types::LogTime;
    use tempfile::tempdir;

    fn env(clock: &ManualClock) -> WriterEnv {
        WriterEnv {
            clock: Arc::new(clock.clone()),
            hosts: Box::new(|_| Some("testhost".to_string())),
            users: Box::new(|uid| Some(format!("user{uid}"))),
        }
    }

    fn message(uid: u16, format: &str, args: Vec<u8>) -> LogMessage {
        LogMessage {
            address: Address::new(0x0a00_0001, 5000),
            uid,
            pid: 77,
            version: 7,
            component_name: "cellapp".to_string(),
            priority: 2,
            format: format.to_string(),
            args,
        }
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(LogTime::new(100, 0));
        let _writer = LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();

        let err = LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap_err();
        assert!(matches!(err, CoreError::WriterLocked { pid, .. } if pid == std::process::id()));
    }

    #[test]
    fn messages_land_in_user_dirs() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(LogTime::new(100, 0));
        let mut writer =
            LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();

        let a = writer
            .add_log_message(&message(1000, "n=%d", 5i32.to_le_bytes().to_vec()))
            .unwrap();
        let b = writer.add_log_message(&message(1001, "plain", vec![])).unwrap();

        assert_eq!(a.address.index, 0);
        assert_eq!(b.address.index, 0);
        assert!(dir.path().join("user1000").join("uid").is_file());
        assert!(dir.path().join("user1001").join("uid").is_file());
        assert_eq!(writer.catalogs().cached_hostname(0x0a00_0001).as_deref(), Some("testhost"));

        let active = ActiveFiles::read(dir.path()).unwrap();
        assert_eq!(active.len(), 4);
    }

    #[test]
    fn malformed_message_appends_nothing() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(LogTime::new(100, 0));
        let mut writer =
            LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();

        let err = writer
            .add_log_message(&message(1000, "%d and %d", 1i32.to_le_bytes().to_vec()))
            .unwrap_err();
        assert!(matches!(err, CoreError::ArgumentUnderrun { .. }));

        let user = writer.user(1000).unwrap();
        assert!(user.active_segment().is_none());
        assert!(user.components().is_empty());
        let files: Vec<_> = std::fs::read_dir(dir.path().join("user1000"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("entries.") || name.starts_with("args."))
            .collect();
        assert!(files.is_empty(), "{files:?}");
        assert!(ActiveFiles::read(dir.path()).unwrap().is_empty());

        let ok = writer.add_log_message(&message(1000, "fine", vec![])).unwrap();
        assert_eq!(ok.address.index, 0);
    }

    #[test]
    fn roll_starts_new_segment() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(LogTime::new(100, 0));
        let mut writer =
            LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();

        let first = writer.add_log_message(&message(1000, "one", vec![])).unwrap();
        writer.roll().unwrap();
        assert!(ActiveFiles::read(dir.path()).unwrap().is_empty());

        clock.advance_millis(2000);
        let second = writer.add_log_message(&message(1000, "two", vec![])).unwrap();
        assert_ne!(first.address.suffix, second.address.suffix);
        assert_eq!(second.address.index, 0);
    }

    #[test]
    fn drop_removes_markers() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(LogTime::new(100, 0));
        {
            let mut writer =
                LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();
            writer.add_log_message(&message(1000, "x", vec![])).unwrap();
            assert!(dir.path().join(ACTIVE_FILES).exists());
        }
        assert!(!dir.path().join(ACTIVE_FILES).exists());
        assert!(!dir.path().join("pid").exists());

        let writer = LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();
        assert!(writer.user(1000).is_some());
    }

    #[test]
    fn app_instance_and_stop_logging() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new(LogTime::new(100, 0));
        let mut writer =
            LogRootWriter::open_with(dir.path(), Config::default(), env(&clock)).unwrap();
        let msg = message(1000, "x", vec![]);
        writer.add_log_message(&msg).unwrap();

        assert!(writer.set_app_instance_id(&msg.address, 9).unwrap());
        assert_eq!(
            writer.user(1000).unwrap().find_component(&msg.address).unwrap().app_id,
            9
        );
        assert!(writer.stop_logging_from_component(&msg.address));
        assert!(!writer.stop_logging_from_component(&msg.address));
        assert!(!writer.set_app_instance_id(&msg.address, 1).unwrap());
    }
}

//! Log root directory layout and the writer's pid lock.
//!
//! ```text
//! <root>/
//! ├─ version           # layout version (ascii int)
//! ├─ component_names   # process type names, one per line
//! ├─ hostnames         # "ip hostname" lines
//! ├─ strings           # binary format string catalog
//! ├─ pid               # writer's exclusive lock
//! ├─ active_files      # files the writer has open
//! └─ <username>/
//!    ├─ uid
//!    ├─ components
//!    ├─ entries.<suffix>
//!    └─ args.<suffix>
//! ```

use crate::error::{CoreError, CoreResult};
use crate::user_log::UID_FILE;
use bwlog_storage::text;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const VERSION_FILE: &str = "version";
const COMPONENT_NAMES_FILE: &str = "component_names";
const HOSTNAMES_FILE: &str = "hostnames";
const STRINGS_FILE: &str = "strings";
const PID_FILE: &str = "pid";

/// Paths within a log root.
#[derive(Debug, Clone)]
pub struct LogRootDir {
    path: PathBuf,
}

impl LogRootDir {
    /// Opens the root at `path`, creating it if asked to.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the path is missing (and not created) or
    /// is not a directory.
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_format(format!(
                    "log root does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "log root is not a directory: {}",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// The root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the format string catalog.
    #[must_use]
    pub fn strings_path(&self) -> PathBuf {
        self.path.join(STRINGS_FILE)
    }

    /// Path of the component names catalog.
    #[must_use]
    pub fn component_names_path(&self) -> PathBuf {
        self.path.join(COMPONENT_NAMES_FILE)
    }

    /// Path of the hostnames cache.
    #[must_use]
    pub fn hostnames_path(&self) -> PathBuf {
        self.path.join(HOSTNAMES_FILE)
    }

    /// Path of the pid lock.
    #[must_use]
    pub fn pid_path(&self) -> PathBuf {
        self.path.join(PID_FILE)
    }

    /// Reads the `version` file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the file holds something other than an
    /// integer.
    pub fn read_version(&self) -> CoreResult<Option<u32>> {
        match text::read_trimmed(&self.path.join(VERSION_FILE))? {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| CoreError::invalid_format(format!("bad version file: {raw:?}"))),
        }
    }

    /// Checks the `version` file against `expected`, writing it if absent
    /// and `create` is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` on a mismatch or a missing file that may not
    /// be created.
    pub fn check_version(&self, expected: u32, create: bool) -> CoreResult<()> {
        match self.read_version()? {
            Some(found) if found == expected => Ok(()),
            Some(found) => Err(CoreError::invalid_format(format!(
                "log root version {found}, expected {expected}"
            ))),
            None if create => {
                let contents = format!("{expected}\n");
                text::write_atomic(&self.path.join(VERSION_FILE), contents.as_bytes())?;
                Ok(())
            }
            None => Err(CoreError::invalid_format(format!(
                "{} is not a log root (no version file)",
                self.path.display()
            ))),
        }
    }

    /// Lists user directories (those holding a `uid` file), sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed.
    pub fn user_dirs(&self) -> CoreResult<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() && path.join(UID_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// Exclusive ownership of a log root by one writer process.
///
/// Acquired by creating the `pid` file, failing if it exists. The file is
/// also advisory-locked while held. Dropping the lock removes the file if it
/// still names this process.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    pid: u32,
    _file: File,
}

impl PidLock {
    /// Takes the lock for the current process.
    ///
    /// # Errors
    ///
    /// Returns `WriterLocked` with the recorded pid if the file exists.
    pub fn acquire(dir: &LogRootDir) -> CoreResult<Self> {
        Self::acquire_as(dir, std::process::id())
    }

    /// Takes the lock on behalf of `pid`.
    ///
    /// # Errors
    ///
    /// Same as [`PidLock::acquire`].
    pub fn acquire_as(dir: &LogRootDir, pid: u32) -> CoreResult<Self> {
        let path = dir.pid_path();
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let holder = Self::holder(&path).unwrap_or(0);
                tracing::error!(path = %path.display(), holder, "log root already has a writer");
                return Err(CoreError::WriterLocked { path, pid: holder });
            }
            Err(e) => return Err(e.into()),
        };

        Self::claim(path, file, pid)
    }

    /// Locks and stamps a freshly created pid file. On failure the file is
    /// removed so it cannot block the next writer.
    fn claim(path: PathBuf, mut file: File, pid: u32) -> CoreResult<Self> {
        let stamped = if file.try_lock_exclusive().is_err() {
            Err(CoreError::WriterLocked {
                path: path.clone(),
                pid: 0,
            })
        } else {
            file.write_all(format!("{pid}\n").as_bytes())
                .and_then(|()| file.sync_all())
                .map_err(CoreError::from)
        };

        match stamped {
            Ok(()) => Ok(Self {
                path,
                pid,
                _file: file,
            }),
            Err(e) => {
                drop(file);
                if let Err(remove) = fs::remove_file(&path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %remove,
                        "failed to remove pid file"
                    );
                }
                Err(e)
            }
        }
    }

    fn holder(path: &Path) -> Option<u32> {
        text::read_trimmed(path).ok().flatten()?.parse().ok()
    }

    /// The pid this lock was taken for.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Returns whether the pid file still names this lock's pid.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        Self::holder(&self.path) == Some(self.pid)
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if self.is_owned() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove pid file"
                );
            }
        }
    }
}

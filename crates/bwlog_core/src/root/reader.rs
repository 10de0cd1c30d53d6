//! Read-only access to a log root.

use super::catalogs::Catalogs;
use super::dir::LogRootDir;
use crate::error::{CoreError, CoreResult};
use crate::format::CatalogMode;
use crate::query::{Query, QueryParams};
use crate::user_log::{read_uid, UserLogReader};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A user known to a log root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// The user's uid.
    pub uid: u16,
    /// The user's directory name.
    pub username: String,
    /// The user's directory.
    pub path: PathBuf,
}

/// Opens a log root for queries.
///
/// Any number of readers may coexist with the writer. Reads never block it;
/// growth is picked up by [`LogRootReader::reload`] or by resuming a query.
#[derive(Debug)]
pub struct LogRootReader {
    dir: LogRootDir,
    version: u32,
    catalogs: Arc<Catalogs>,
    users: BTreeMap<u16, UserInfo>,
}

impl LogRootReader {
    /// Opens the root at `path`, whatever version its writer recorded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `path` has no readable `version` file, or
    /// an I/O error.
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let dir = LogRootDir::open(path.as_ref(), false)?;
        let Some(version) = dir.read_version()? else {
            return Err(CoreError::invalid_format(format!(
                "{} is not a log root (no version file)",
                dir.path().display()
            )));
        };
        Self::with_dir(dir, version)
    }

    /// Opens the root at `path`, requiring its `version` file to hold
    /// `version`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` on a version mismatch or a missing version
    /// file, or an I/O error.
    pub fn open_expecting<P: AsRef<Path>>(path: P, version: u32) -> CoreResult<Self> {
        let dir = LogRootDir::open(path.as_ref(), false)?;
        dir.check_version(version, false)?;
        Self::with_dir(dir, version)
    }

    fn with_dir(dir: LogRootDir, version: u32) -> CoreResult<Self> {
        let catalogs = Arc::new(Catalogs::open(&dir, CatalogMode::ReadOnly)?);

        let mut reader = Self {
            dir,
            version,
            catalogs,
            users: BTreeMap::new(),
        };
        reader.scan_users()?;
        tracing::debug!(
            path = %reader.dir.path().display(),
            version,
            users = reader.users.len(),
            "opened log root"
        );
        Ok(reader)
    }

    fn scan_users(&mut self) -> CoreResult<()> {
        self.users.clear();
        for path in self.dir.user_dirs()? {
            let Some(username) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };
            match read_uid(&path) {
                Ok(uid) => {
                    self.users.insert(uid, UserInfo { uid, username, path });
                }
                Err(e) => {
                    tracing::warn!(dir = %path.display(), error = %e, "skipping user directory");
                }
            }
        }
        Ok(())
    }

    /// Picks up new users and catalog growth.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or a catalog cannot be read.
    pub fn reload(&mut self) -> CoreResult<()> {
        self.catalogs.reload()?;
        self.scan_users()
    }

    /// The root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The version recorded in the root's `version` file.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The root's catalogs.
    #[must_use]
    pub fn catalogs(&self) -> &Arc<Catalogs> {
        &self.catalogs
    }

    /// Users in uid order.
    pub fn users(&self) -> impl Iterator<Item = &UserInfo> + '_ {
        self.users.values()
    }

    /// The directory name of `uid`.
    #[must_use]
    pub fn username(&self, uid: u16) -> Option<&str> {
        self.users.get(&uid).map(|u| u.username.as_str())
    }

    /// The uid whose directory is named `username`.
    #[must_use]
    pub fn uid_of(&self, username: &str) -> Option<u16> {
        self.users
            .values()
            .find(|u| u.username == username)
            .map(|u| u.uid)
    }

    /// Opens `uid`'s log.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser` if the root has no log for `uid`.
    pub fn user_log(&self, uid: u16) -> CoreResult<UserLogReader> {
        let info = self.users.get(&uid).ok_or(CoreError::UnknownUser { uid })?;
        UserLogReader::open(&info.path)
    }

    /// Known hosts as `(address, name)`, in address order.
    #[must_use]
    pub fn hostnames(&self) -> Vec<(Ipv4Addr, String)> {
        self.catalogs
            .hostnames()
            .iter()
            .map(|(ip, name)| (ip, name.to_string()))
            .collect()
    }

    /// Known process types as `(id, name)`.
    #[must_use]
    pub fn component_names(&self) -> Vec<(u8, String)> {
        self.catalogs
            .component_names()
            .iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect()
    }

    /// Known format strings as `(offset, text)`, in file order.
    #[must_use]
    pub fn format_strings(&self) -> Vec<(u32, String)> {
        self.catalogs
            .formats()
            .iter()
            .map(|f| (f.offset, f.text.clone()))
            .collect()
    }

    /// Starts a query over one user's log.
    ///
    /// # Errors
    ///
    /// Returns `UnknownUser`, `UnknownHost`, `InvalidRegex` or
    /// `InvalidRange` if the parameters do not fit this root.
    pub fn query(&self, params: QueryParams) -> CoreResult<Query> {
        let log = self.user_log(params.uid)?;
        Query::new(log, Arc::clone(&self.catalogs), params)
    }
}

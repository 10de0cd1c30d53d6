//! The `active_files` marker read by external archivers.
//!
//! Lists, one per line and relative to the root, the entries and args files
//! the writer currently has open. An archiver must leave those alone. While
//! a new segment is being created the marker is deleted, so an archiver
//! never sees a list that misses the file about to be written.

use crate::error::CoreResult;
use bwlog_storage::text;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the marker file in the log root.
pub const ACTIVE_FILES: &str = "active_files";

/// In-memory copy of the marker contents.
#[derive(Debug)]
pub struct ActiveFiles {
    path: PathBuf,
    files: BTreeMap<String, (String, String)>,
}

impl ActiveFiles {
    /// Creates an empty marker for the root at `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(ACTIVE_FILES),
            files: BTreeMap::new(),
        }
    }

    /// Records `username`'s open segment files.
    pub fn set(&mut self, username: &str, entries: String, args: String) {
        self.files.insert(username.to_string(), (entries, args));
    }

    /// Forgets `username`'s open files.
    pub fn remove(&mut self, username: &str) {
        self.files.remove(username);
    }

    /// Forgets every user's files.
    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Deletes the marker file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be removed.
    pub fn delete_file(&self) -> CoreResult<()> {
        text::remove_if_exists(&self.path)?;
        Ok(())
    }

    /// Rewrites the marker file from memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn update(&self) -> CoreResult<()> {
        let mut contents = String::new();
        for line in self.lines() {
            contents.push_str(&line);
            contents.push('\n');
        }
        text::write_atomic(&self.path, contents.as_bytes())?;
        Ok(())
    }

    /// The lines the marker holds, in user order.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.files
            .iter()
            .flat_map(|(user, (entries, args))| {
                [format!("{user}/{entries}"), format!("{user}/{args}")]
            })
            .collect()
    }

    /// Reads the marker of the root at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists and cannot be read.
    pub fn read(root: &Path) -> CoreResult<Vec<String>> {
        Ok(text::read_lines(&root.join(ACTIVE_FILES))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn update_and_delete() {
        let dir = tempdir().unwrap();
        let mut active = ActiveFiles::new(dir.path());

        active.set("bob", "entries.s2".into(), "args.s2".into());
        active.set("alice", "entries.s1".into(), "args.s1".into());
        active.update().unwrap();

        assert_eq!(
            ActiveFiles::read(dir.path()).unwrap(),
            vec![
                "alice/entries.s1",
                "alice/args.s1",
                "bob/entries.s2",
                "bob/args.s2"
            ]
        );

        active.remove("alice");
        active.update().unwrap();
        assert_eq!(ActiveFiles::read(dir.path()).unwrap().len(), 2);

        active.delete_file().unwrap();
        assert!(!dir.path().join(ACTIVE_FILES).exists());
        active.delete_file().unwrap();
    }
}

//! The `component_names` file: process type names, one per line.
//!
//! A name's id is its line number. The set is small, so name to id is a
//! linear scan.

use crate::error::{CoreError, CoreResult};
use crate::format::CatalogMode;
use bwlog_storage::text;
use std::path::{Path, PathBuf};

/// Most names the catalog holds; ids must fit a 32-bit type mask.
pub const MAX_COMPONENT_NAMES: usize = 32;

/// Append-only list of component (process type) names.
#[derive(Debug)]
pub struct ComponentNames {
    path: PathBuf,
    mode: CatalogMode,
    names: Vec<String>,
}

impl ComponentNames {
    /// Opens the names file. A missing file is an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: &Path, mode: CatalogMode) -> CoreResult<Self> {
        let mut names = Self {
            path: path.to_path_buf(),
            mode,
            names: Vec::new(),
        };
        names.reload()?;
        Ok(names)
    }

    /// Re-reads the file, returning the number of names added.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn reload(&mut self) -> CoreResult<usize> {
        let lines = text::read_lines(&self.path)?;
        let before = self.names.len();
        self.names = lines.into_iter().filter(|l| !l.is_empty()).collect();
        Ok(self.names.len().saturating_sub(before))
    }

    /// Returns the id of `name`.
    #[must_use]
    pub fn get_id(&self, name: &str) -> Option<u8> {
        self.names.iter().position(|n| n == name).map(|i| i as u8)
    }

    /// Returns the id of `name`, adding it if this is an append catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogFull` when no ids are left, `InvalidOperation` for an
    /// unknown name in a read-only catalog, or an I/O error.
    pub fn get_or_create_id(&mut self, name: &str) -> CoreResult<u8> {
        if let Some(id) = self.get_id(name) {
            return Ok(id);
        }
        if self.mode == CatalogMode::ReadOnly {
            return Err(CoreError::invalid_operation(format!(
                "component name {name:?} not in read-only catalog"
            )));
        }
        if self.names.len() >= MAX_COMPONENT_NAMES {
            return Err(CoreError::CatalogFull {
                name: "component_names".to_string(),
            });
        }
        if name.is_empty() || name.contains('\n') {
            return Err(CoreError::invalid_operation(format!(
                "bad component name {name:?}"
            )));
        }

        text::append_line(&self.path, name)?;
        self.names.push(name.to_string());
        tracing::info!(name, id = self.names.len() - 1, "new component type");
        Ok((self.names.len() - 1) as u8)
    }

    /// Returns the name for `id`.
    #[must_use]
    pub fn name(&self, id: u8) -> Option<&str> {
        self.names.get(usize::from(id)).map(String::as_str)
    }

    /// Number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns whether there are no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates `(id, name)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (i as u8, n.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ids_follow_insertion_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("component_names");
        let mut names = ComponentNames::open(&path, CatalogMode::Append).unwrap();

        assert_eq!(names.get_or_create_id("cellapp").unwrap(), 0);
        assert_eq!(names.get_or_create_id("baseapp").unwrap(), 1);
        assert_eq!(names.get_or_create_id("cellapp").unwrap(), 0);
        assert_eq!(names.name(1), Some("baseapp"));
        assert_eq!(names.name(7), None);

        let reopened = ComponentNames::open(&path, CatalogMode::ReadOnly).unwrap();
        let all: Vec<_> = reopened.iter().collect();
        assert_eq!(all, vec![(0, "cellapp"), (1, "baseapp")]);
    }

    #[test]
    fn read_only_cannot_add() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("component_names");
        let mut names = ComponentNames::open(&path, CatalogMode::ReadOnly).unwrap();
        assert!(names.is_empty());
        assert!(names.get_or_create_id("dbapp").is_err());
    }

    #[test]
    fn capacity_is_bounded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("component_names");
        let mut names = ComponentNames::open(&path, CatalogMode::Append).unwrap();
        for i in 0..MAX_COMPONENT_NAMES {
            names.get_or_create_id(&format!("type{i}")).unwrap();
        }
        assert!(matches!(
            names.get_or_create_id("one_too_many"),
            Err(CoreError::CatalogFull { .. })
        ));
    }

    #[test]
    fn reader_reload_sees_new_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("component_names");
        let mut writer = ComponentNames::open(&path, CatalogMode::Append).unwrap();
        let mut reader = ComponentNames::open(&path, CatalogMode::ReadOnly).unwrap();

        writer.get_or_create_id("loginapp").unwrap();
        assert_eq!(reader.get_id("loginapp"), None);
        assert_eq!(reader.reload().unwrap(), 1);
        assert_eq!(reader.get_id("loginapp"), Some(0));
    }
}

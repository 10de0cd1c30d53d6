//! The `strings` file: an append-only catalog of compiled format strings.
//!
//! Each record is `[record_len u32][body]`, where the body is
//! [`FormatString::encode`]. A record's byte offset is its identity and is
//! what log entries store; offsets are never reused.

use super::token::FormatString;
use crate::codec::split_records;
use crate::error::{CoreError, CoreResult};
use bwlog_storage::{FileBackend, StorageBackend};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Whether a catalog may register new format strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    /// Writer: unknown formats are compiled and appended.
    Append,
    /// Reader: unknown formats fail lookup.
    ReadOnly,
}

/// Offset-addressed catalog of format strings.
pub struct FormatCatalog {
    backend: Box<dyn StorageBackend>,
    mode: CatalogMode,
    by_text: HashMap<String, u32>,
    by_offset: HashMap<u32, Arc<FormatString>>,
    order: Vec<u32>,
    loaded_size: u64,
}

impl std::fmt::Debug for FormatCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatCatalog")
            .field("mode", &self.mode)
            .field("entries", &self.order.len())
            .field("loaded_size", &self.loaded_size)
            .finish()
    }
}

impl FormatCatalog {
    /// Opens the catalog file at `path`.
    ///
    /// Append mode creates the file if needed; read-only mode requires it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path, mode: CatalogMode) -> CoreResult<Self> {
        let backend: Box<dyn StorageBackend> = match mode {
            CatalogMode::Append => Box::new(FileBackend::open(path)?),
            CatalogMode::ReadOnly => Box::new(FileBackend::open_read_only(path)?),
        };
        Self::with_backend(backend, mode)
    }

    /// Opens a catalog over an existing backend and loads its records.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn with_backend(backend: Box<dyn StorageBackend>, mode: CatalogMode) -> CoreResult<Self> {
        let mut catalog = Self {
            backend,
            mode,
            by_text: HashMap::new(),
            by_offset: HashMap::new(),
            order: Vec::new(),
            loaded_size: 0,
        };
        catalog.reload()?;
        Ok(catalog)
    }

    /// Returns the catalog mode.
    #[must_use]
    pub fn mode(&self) -> CatalogMode {
        self.mode
    }

    /// Number of format strings loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether no format strings are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Loads records appended since the last load.
    ///
    /// A partially written trailing record is left for the next reload. A
    /// record whose body fails to decode is logged and skipped.
    ///
    /// Returns the number of new records.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn reload(&mut self) -> CoreResult<usize> {
        let size = self.backend.refresh_size()?;
        if size <= self.loaded_size {
            return Ok(0);
        }

        let start = self.loaded_size;
        let data = self.backend.read_at(start, (size - start) as usize)?;
        let (records, used) = split_records(&data);
        let mut added = 0usize;

        for (pos, body) in records {
            let offset = (start + pos as u64) as u32;
            match FormatString::decode(body, offset) {
                Ok(format) => {
                    self.insert(format);
                    added += 1;
                }
                Err(e) => tracing::warn!(offset, error = %e, "skipping unreadable format record"),
            }
        }

        self.loaded_size = start + used as u64;
        if added > 0 {
            tracing::debug!(added, total = self.order.len(), "loaded format strings");
        }
        Ok(added)
    }

    fn insert(&mut self, format: FormatString) {
        let offset = format.offset;
        self.by_text.entry(format.text.clone()).or_insert(offset);
        self.by_offset.insert(offset, Arc::new(format));
        self.order.push(offset);
    }

    /// Returns the compiled format for `text`, registering it if needed.
    ///
    /// Resolving the same text again returns the same record and does not
    /// grow the file.
    ///
    /// # Errors
    ///
    /// Returns `UnknownFormatString` in read-only mode if `text` has never
    /// been registered, `InvalidFormatString` if it does not compile, or a
    /// storage error if the append fails.
    pub fn resolve(&mut self, text: &str) -> CoreResult<Arc<FormatString>> {
        if let Some(format) = self.find(text) {
            return Ok(format);
        }

        if self.mode == CatalogMode::ReadOnly {
            self.reload()?;
            return self.find(text).ok_or_else(|| CoreError::UnknownFormatString {
                text: text.to_string(),
            });
        }

        let mut format = FormatString::parse(text)?;
        let body = format.encode();
        let mut record = Vec::with_capacity(4 + body.len());
        record.extend_from_slice(&(body.len() as u32).to_le_bytes());
        record.extend_from_slice(&body);

        let offset = self.backend.append(&record)?;
        self.backend.flush()?;
        let offset = u32::try_from(offset).map_err(|_| CoreError::CatalogFull {
            name: "strings".to_string(),
        })?;

        format.offset = offset;
        self.loaded_size = self.backend.size()?;
        tracing::debug!(offset, text, "registered format string");

        self.insert(format);
        self.find(text)
            .ok_or_else(|| CoreError::catalog_corruption("format vanished after insert"))
    }

    fn find(&self, text: &str) -> Option<Arc<FormatString>> {
        self.by_text
            .get(text)
            .and_then(|offset| self.by_offset.get(offset))
            .cloned()
    }

    /// Returns the offset of `text` if it is registered.
    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<u32> {
        self.by_text.get(text).copied()
    }

    /// Returns the format stored at `offset`, if loaded.
    #[must_use]
    pub fn get(&self, offset: u32) -> Option<Arc<FormatString>> {
        self.by_offset.get(&offset).cloned()
    }

    /// Returns the format at `offset`, reloading once on a miss.
    ///
    /// # Errors
    ///
    /// Returns `CatalogCorruption` if no record starts at `offset`.
    pub fn get_or_reload(&mut self, offset: u32) -> CoreResult<Arc<FormatString>> {
        if let Some(format) = self.get(offset) {
            return Ok(format);
        }
        self.reload()?;
        self.get(offset).ok_or_else(|| {
            CoreError::catalog_corruption(format!("no format string at offset {offset}"))
        })
    }

    /// Iterates over the loaded formats in file order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FormatString>> + '_ {
        self.order.iter().filter_map(|o| self.by_offset.get(o))
    }
}

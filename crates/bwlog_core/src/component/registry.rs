//! Per-user registry of logging components, backed by the `components` file.

use super::record::{ComponentIdentity, LoggingComponent, APP_ID_OFFSET};
use crate::codec::split_records;
use crate::error::{CoreError, CoreResult};
use crate::types::{Address, EntryAddress};
use bwlog_storage::{FileBackend, StorageBackend};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// The components of one user log.
///
/// A component reaches disk only once its first entry is written, because
/// the record carries that entry's address.
pub struct ComponentRegistry {
    backend: Box<dyn StorageBackend>,
    writable: bool,
    by_address: HashMap<Address, i32>,
    by_id: BTreeMap<i32, LoggingComponent>,
    next_id: i32,
    loaded_size: u64,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("writable", &self.writable)
            .field("components", &self.by_id.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl ComponentRegistry {
    /// Opens the `components` file. Writers create it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn open(path: &Path, writable: bool) -> CoreResult<Self> {
        let backend: Box<dyn StorageBackend> = if writable {
            Box::new(FileBackend::open(path)?)
        } else {
            Box::new(FileBackend::open_read_only(path)?)
        };
        Self::with_backend(backend, writable)
    }

    /// Opens a registry over an existing backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn with_backend(backend: Box<dyn StorageBackend>, writable: bool) -> CoreResult<Self> {
        let mut registry = Self {
            backend,
            writable,
            by_address: HashMap::new(),
            by_id: BTreeMap::new(),
            next_id: 0,
            loaded_size: 0,
        };
        registry.reload()?;
        Ok(registry)
    }

    /// Loads records appended since the last load.
    ///
    /// Later records for an address replace earlier ones in the address
    /// index; every record stays reachable by id. The id ticker continues
    /// past the highest id seen.
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
            let file_offset = start + pos as u64;
            match LoggingComponent::decode(body, file_offset) {
                Ok(component) => {
                    self.next_id = self.next_id.max(component.id.saturating_add(1));
                    self.by_address.insert(component.address, component.id);
                    self.by_id.insert(component.id, component);
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(file_offset, error = %e, "skipping unreadable component record");
                }
            }
        }

        self.loaded_size = start + used as u64;
        Ok(added)
    }

    /// Returns the id of the component for `identity`, creating it if needed.
    ///
    /// If the address is known but its identity changed (a restarted
    /// process, say), the old component is evicted and a new one gets a
    /// fresh id. Ids are never reused.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` on a read-only registry.
    pub fn get_or_create(&mut self, identity: &ComponentIdentity) -> CoreResult<i32> {
        if !self.writable {
            return Err(CoreError::invalid_operation(
                "cannot create components in a read-only registry",
            ));
        }

        if let Some(&id) = self.by_address.get(&identity.address) {
            let unchanged = self
                .by_id
                .get(&id)
                .is_some_and(|existing| existing.identity() == *identity);
            if unchanged {
                return Ok(id);
            }
            tracing::debug!(address = %identity.address, old_id = id, "component identity changed");
            self.by_address.remove(&identity.address);
            self.by_id.remove(&id);
        }

        let id = self.next_id;
        self.next_id += 1;
        self.by_address.insert(identity.address, id);
        self.by_id.insert(id, LoggingComponent::new(identity, id));
        tracing::debug!(address = %identity.address, id, pid = identity.pid, "new component");
        Ok(id)
    }

    /// Returns the component with `id`.
    #[must_use]
    pub fn get_by_id(&self, id: i32) -> Option<&LoggingComponent> {
        self.by_id.get(&id)
    }

    /// Returns the current component at `address`.
    #[must_use]
    pub fn get_by_address(&self, address: &Address) -> Option<&LoggingComponent> {
        self.by_address
            .get(address)
            .and_then(|id| self.by_id.get(id))
    }

    /// Forgets the component at `address` (the process exited).
    ///
    /// Its record stays on disk for readers. Returns whether one was removed.
    pub fn erase(&mut self, address: &Address) -> bool {
        match self.by_address.remove(address) {
            Some(id) => {
                self.by_id.remove(&id);
                true
            }
            None => false,
        }
    }

    /// Sets a component's app instance id.
    ///
    /// If the record is already on disk its `app_id` field is overwritten
    /// in place; repeating the patch is harmless.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an unknown id or read-only registry,
    /// or a storage error if the patch fails.
    pub fn patch_app_instance_id(&mut self, id: i32, app_id: i32) -> CoreResult<()> {
        if !self.writable {
            return Err(CoreError::invalid_operation(
                "cannot patch a read-only registry",
            ));
        }
        let component = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("no component with id {id}")))?;

        component.app_id = app_id;
        if let Some(offset) = component.file_offset {
            self.backend
                .write_at(offset + APP_ID_OFFSET, &app_id.to_le_bytes())?;
            self.backend.flush()?;
        }
        Ok(())
    }

    /// Records a component's first entry and writes its record.
    ///
    /// Does nothing if the component is already on disk.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for an unknown id, or a storage error.
    pub fn write_first_entry(&mut self, id: i32, first: EntryAddress) -> CoreResult<()> {
        let component = self
            .by_id
            .get_mut(&id)
            .ok_or_else(|| CoreError::invalid_operation(format!("no component with id {id}")))?;
        if component.file_offset.is_some() {
            return Ok(());
        }

        component.first_entry = Some(first);
        let record = component.encode()?;
        let offset = self.backend.append(&record)?;
        self.backend.flush()?;
        component.file_offset = Some(offset);
        self.loaded_size = self.backend.size()?;
        Ok(())
    }

    /// Returns whether `id` has been written to disk.
    #[must_use]
    pub fn is_written(&self, id: i32) -> bool {
        self.by_id
            .get(&id)
            .is_some_and(|c| c.file_offset.is_some())
    }

    /// Number of components held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Iterates components in id order.
    pub fn iter(&self) -> impl Iterator<Item = &LoggingComponent> + '_ {
        self.by_id.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwlog_storage::InMemoryBackend;

    fn identity(port: u16, pid: i32) -> ComponentIdentity {
        ComponentIdentity {
            address: Address::new(0x0A00_0001, port),
            version: 7,
            uid: 1000,
            pid,
            type_id: 1,
        }
    }

    fn writer() -> (ComponentRegistry, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let registry = ComponentRegistry::with_backend(Box::new(backend.clone()), true).unwrap();
        (registry, backend)
    }

    #[test]
    fn same_identity_same_id() {
        let (mut registry, _) = writer();
        let a = registry.get_or_create(&identity(1, 10)).unwrap();
        let b = registry.get_or_create(&identity(2, 11)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.get_or_create(&identity(1, 10)).unwrap(), a);
    }

    #[test]
    fn changed_identity_evicts() {
        let (mut registry, _) = writer();
        let old = registry.get_or_create(&identity(1, 10)).unwrap();
        let new = registry.get_or_create(&identity(1, 99)).unwrap();

        assert!(new > old);
        assert!(registry.get_by_id(old).is_none());
        assert_eq!(registry.get_by_address(&identity(1, 0).address).unwrap().id, new);
    }

    #[test]
    fn record_written_with_first_entry_only() {
        let (mut registry, backend) = writer();
        let id = registry.get_or_create(&identity(1, 10)).unwrap();
        assert!(backend.data().is_empty());
        assert!(!registry.is_written(id));

        registry
            .write_first_entry(id, EntryAddress::new("sfx", 3))
            .unwrap();
        let size = backend.data().len();
        assert!(size > 0);

        // Second call is a no-op
        registry
            .write_first_entry(id, EntryAddress::new("sfx", 4))
            .unwrap();
        assert_eq!(backend.data().len(), size);

        let reader = ComponentRegistry::with_backend(Box::new(backend), false).unwrap();
        let loaded = reader.get_by_id(id).unwrap();
        assert_eq!(loaded.first_entry, Some(EntryAddress::new("sfx", 3)));
        assert_eq!(loaded.pid, 10);
    }

    #[test]
    fn app_id_patch_is_in_place() {
        let (mut registry, backend) = writer();
        let id = registry.get_or_create(&identity(1, 10)).unwrap();

        // Before the record exists the patch is memory-only
        registry.patch_app_instance_id(id, 5).unwrap();
        registry
            .write_first_entry(id, EntryAddress::new("sfx", 0))
            .unwrap();
        let size = backend.data().len();

        registry.patch_app_instance_id(id, 77).unwrap();
        registry.patch_app_instance_id(id, 77).unwrap();
        assert_eq!(backend.data().len(), size);

        let reader = ComponentRegistry::with_backend(Box::new(backend), false).unwrap();
        assert_eq!(reader.get_by_id(id).unwrap().app_id, 77);
    }

    #[test]
    fn restart_continues_ticker() {
        let (mut registry, backend) = writer();
        for port in 1..=3 {
            let id = registry.get_or_create(&identity(port, 10)).unwrap();
            registry
                .write_first_entry(id, EntryAddress::new("sfx", u32::from(port)))
                .unwrap();
        }

        let mut restarted = ComponentRegistry::with_backend(Box::new(backend), true).unwrap();
        assert_eq!(restarted.len(), 3);
        let id = restarted.get_or_create(&identity(9, 10)).unwrap();
        assert_eq!(id, 3);
        // Known identity maps back to its persisted id
        assert_eq!(restarted.get_or_create(&identity(2, 10)).unwrap(), 1);
    }

    #[test]
    fn erase_forgets_address() {
        let (mut registry, _) = writer();
        let id = registry.get_or_create(&identity(1, 10)).unwrap();
        assert!(registry.erase(&identity(1, 10).address));
        assert!(!registry.erase(&identity(1, 10).address));
        assert!(registry.get_by_id(id).is_none());
        assert!(registry.get_or_create(&identity(1, 10)).unwrap() > id);
    }

    #[test]
    fn read_only_refuses_changes() {
        let mut registry =
            ComponentRegistry::with_backend(Box::new(InMemoryBackend::new()), false).unwrap();
        assert!(registry.get_or_create(&identity(1, 10)).is_err());
        assert!(registry.patch_app_instance_id(0, 1).is_err());
    }
}

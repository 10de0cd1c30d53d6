//! The root-wide catalogs, shared between a root and its queries.

use super::dir::LogRootDir;
use crate::error::CoreResult;
use crate::format::{CatalogMode, FormatCatalog, FormatString};
use crate::names::{ComponentNames, HostResolver, Hostnames};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// Format strings, component names and hostnames of one log root.
///
/// Readers share one instance through an `Arc`; lookups that miss reload
/// the backing file once before giving up.
#[derive(Debug)]
pub struct Catalogs {
    formats: RwLock<FormatCatalog>,
    component_names: RwLock<ComponentNames>,
    hostnames: RwLock<Hostnames>,
}

impl Catalogs {
    /// Opens all three catalogs of `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a catalog cannot be opened.
    pub fn open(dir: &LogRootDir, mode: CatalogMode) -> CoreResult<Self> {
        Ok(Self {
            formats: RwLock::new(FormatCatalog::open(&dir.strings_path(), mode)?),
            component_names: RwLock::new(ComponentNames::open(&dir.component_names_path(), mode)?),
            hostnames: RwLock::new(Hostnames::open(&dir.hostnames_path(), mode)?),
        })
    }

    /// Picks up catalog growth.
    ///
    /// # Errors
    ///
    /// Returns an error if a catalog cannot be read.
    pub fn reload(&self) -> CoreResult<()> {
        self.formats.write().reload()?;
        self.component_names.write().reload()?;
        self.hostnames.write().reload()?;
        Ok(())
    }

    /// Returns the format string at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `CatalogCorruption` if no record starts at `offset`.
    pub fn format(&self, offset: u32) -> CoreResult<Arc<FormatString>> {
        if let Some(format) = self.formats.read().get(offset) {
            return Ok(format);
        }
        self.formats.write().get_or_reload(offset)
    }

    /// Resolves (and in append mode registers) a format string.
    ///
    /// # Errors
    ///
    /// See [`FormatCatalog::resolve`].
    pub fn resolve_format(&self, text: &str) -> CoreResult<Arc<FormatString>> {
        self.formats.write().resolve(text)
    }

    /// Returns the name of component type `id`.
    #[must_use]
    pub fn component_name(&self, id: u8) -> Option<String> {
        if let Some(name) = self.component_names.read().name(id) {
            return Some(name.to_string());
        }
        let mut names = self.component_names.write();
        if let Err(e) = names.reload() {
            tracing::warn!(error = %e, "failed to reload component names");
        }
        names.name(id).map(str::to_string)
    }

    /// Returns the id of component type `name`, registering it if allowed.
    ///
    /// # Errors
    ///
    /// See [`ComponentNames::get_or_create_id`].
    pub fn component_type_id(&self, name: &str) -> CoreResult<u8> {
        self.component_names.write().get_or_create_id(name)
    }

    /// Returns the hostname of `ip`, resolving it on first sight.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be appended to.
    pub fn hostname(&self, ip: u32, resolver: &dyn HostResolver) -> CoreResult<String> {
        if let Some(name) = self.hostnames.read().name(ip) {
            return Ok(name.to_string());
        }
        self.hostnames.write().get_host_by_addr(ip, resolver)
    }

    /// Returns the cached hostname of `ip` without resolving.
    #[must_use]
    pub fn cached_hostname(&self, ip: u32) -> Option<String> {
        self.hostnames.read().name(ip).map(str::to_string)
    }

    /// Returns the address of a cached hostname or a dotted quad.
    #[must_use]
    pub fn addr_by_host(&self, host: &str) -> Option<u32> {
        if let Some(addr) = self.hostnames.read().get_addr_by_host(host) {
            return Some(addr);
        }
        let mut hostnames = self.hostnames.write();
        if let Err(e) = hostnames.reload() {
            tracing::warn!(error = %e, "failed to reload hostnames");
        }
        hostnames.get_addr_by_host(host)
    }

    /// Read access to the format catalog.
    pub fn formats(&self) -> RwLockReadGuard<'_, FormatCatalog> {
        self.formats.read()
    }

    /// Read access to the component names.
    pub fn component_names(&self) -> RwLockReadGuard<'_, ComponentNames> {
        self.component_names.read()
    }

    /// Read access to the hostname cache.
    pub fn hostnames(&self) -> RwLockReadGuard<'_, Hostnames> {
        self.hostnames.read()
    }
}

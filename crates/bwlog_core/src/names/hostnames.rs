//! The `hostnames` file: a persistent reverse-lookup cache.
//!
//! Lines are `<dotted quad> <hostname>`. A writer resolves each new address
//! once, ever: the result, or the dotted quad if resolution failed, is
//! appended and never looked up again.

use crate::error::CoreResult;
use crate::format::CatalogMode;
use bwlog_storage::text;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Reverse name resolution.
pub trait HostResolver: Send + Sync {
    /// Returns the hostname for `ip`, if one is known.
    fn reverse(&self, ip: Ipv4Addr) -> Option<String>;
}

impl<F> HostResolver for F
where
    F: Fn(Ipv4Addr) -> Option<String> + Send + Sync,
{
    fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        self(ip)
    }
}

/// Resolves through a hosts(5) file; no network access.
#[derive(Debug, Clone)]
pub struct HostsFileResolver {
    path: PathBuf,
}

impl Default for HostsFileResolver {
    fn default() -> Self {
        Self::new("/etc/hosts")
    }
}

impl HostsFileResolver {
    /// Creates a resolver reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HostResolver for HostsFileResolver {
    fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        let lines = text::read_lines(&self.path).ok()?;
        lines.iter().find_map(|line| {
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let addr: Ipv4Addr = fields.next()?.parse().ok()?;
            if addr == ip {
                fields.next().map(str::to_string)
            } else {
                None
            }
        })
    }
}

/// IP to hostname map backed by the `hostnames` file.
#[derive(Debug)]
pub struct Hostnames {
    path: PathBuf,
    mode: CatalogMode,
    by_ip: BTreeMap<u32, String>,
}

impl Hostnames {
    /// Opens the hostnames file. A missing file is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: &Path, mode: CatalogMode) -> CoreResult<Self> {
        let mut hostnames = Self {
            path: path.to_path_buf(),
            mode,
            by_ip: BTreeMap::new(),
        };
        hostnames.reload()?;
        Ok(hostnames)
    }

    /// Re-reads the file, returning the number of new addresses.
    ///
    /// Malformed lines are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn reload(&mut self) -> CoreResult<usize> {
        let before = self.by_ip.len();
        for line in text::read_lines(&self.path)? {
            let mut fields = line.split_whitespace();
            let (Some(ip), Some(host)) = (fields.next(), fields.next()) else {
                if !line.trim().is_empty() {
                    tracing::warn!(line = %line, "malformed hostnames line");
                }
                continue;
            };
            match ip.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    self.by_ip.entry(u32::from(ip)).or_insert_with(|| host.to_string());
                }
                Err(_) => tracing::warn!(line = %line, "malformed address in hostnames"),
            }
        }
        Ok(self.by_ip.len() - before)
    }

    /// Returns the cached name of `ip`.
    #[must_use]
    pub fn name(&self, ip: u32) -> Option<&str> {
        self.by_ip.get(&ip).map(String::as_str)
    }

    /// Returns the name of `ip`, resolving and persisting it on first sight.
    ///
    /// Read-only caches never persist; an unknown address reads as its
    /// dotted quad.
    ///
    /// # Errors
    ///
    /// Returns an error if the new line cannot be appended.
    pub fn get_host_by_addr(&mut self, ip: u32, resolver: &dyn HostResolver) -> CoreResult<String> {
        if let Some(name) = self.by_ip.get(&ip) {
            return Ok(name.clone());
        }

        let addr = Ipv4Addr::from(ip);
        if self.mode == CatalogMode::ReadOnly {
            return Ok(addr.to_string());
        }

        let name = resolver.reverse(addr).unwrap_or_else(|| {
            tracing::debug!(%addr, "reverse lookup failed, caching address");
            addr.to_string()
        });
        text::append_line(&self.path, &format!("{addr} {name}"))?;
        self.by_ip.insert(ip, name.clone());
        Ok(name)
    }

    /// Returns the address for a hostname or dotted quad.
    ///
    /// Hostnames are only found if they are in the cache.
    #[must_use]
    pub fn get_addr_by_host(&self, host: &str) -> Option<u32> {
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return Some(u32::from(addr));
        }
        self.by_ip
            .iter()
            .find(|(_, name)| name.as_str() == host)
            .map(|(&ip, _)| ip)
    }

    /// Number of cached addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }

    /// Iterates `(address, hostname)` in address order.
    pub fn iter(&self) -> impl Iterator<Item = (Ipv4Addr, &str)> + '_ {
        self.by_ip
            .iter()
            .map(|(&ip, name)| (Ipv4Addr::from(ip), name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn resolves_once_and_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hostnames");
        let calls = AtomicUsize::new(0);
        let resolver = |ip: Ipv4Addr| {
            calls.fetch_add(1, Ordering::SeqCst);
            (ip == Ipv4Addr::new(10, 0, 0, 1)).then(|| "alpha".to_string())
        };

        let mut hosts = Hostnames::open(&path, CatalogMode::Append).unwrap();
        let alpha = u32::from(Ipv4Addr::new(10, 0, 0, 1));
        let beta = u32::from(Ipv4Addr::new(10, 0, 0, 2));

        assert_eq!(hosts.get_host_by_addr(alpha, &resolver).unwrap(), "alpha");
        assert_eq!(hosts.get_host_by_addr(alpha, &resolver).unwrap(), "alpha");
        assert_eq!(hosts.get_host_by_addr(beta, &resolver).unwrap(), "10.0.0.2");
        assert_eq!(hosts.get_host_by_addr(beta, &resolver).unwrap(), "10.0.0.2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Failed lookups are remembered across restarts too
        let mut reopened = Hostnames::open(&path, CatalogMode::Append).unwrap();
        assert_eq!(reopened.get_host_by_addr(beta, &resolver).unwrap(), "10.0.0.2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reverse_lookup_by_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hostnames");
        text::append_line(&path, "192.168.1.5 web1").unwrap();
        text::append_line(&path, "garbage").unwrap();

        let hosts = Hostnames::open(&path, CatalogMode::ReadOnly).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(
            hosts.get_addr_by_host("web1"),
            Some(u32::from(Ipv4Addr::new(192, 168, 1, 5)))
        );
        assert_eq!(hosts.get_addr_by_host("10.1.2.3"), Some(0x0A01_0203));
        assert_eq!(hosts.get_addr_by_host("nowhere"), None);
    }

    #[test]
    fn read_only_does_not_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hostnames");
        let mut hosts = Hostnames::open(&path, CatalogMode::ReadOnly).unwrap();
        let name = hosts
            .get_host_by_addr(0x7F00_0001, &|_: Ipv4Addr| Some("lo".to_string()))
            .unwrap();
        assert_eq!(name, "127.0.0.1");
        assert!(!path.exists());
    }

    #[test]
    fn hosts_file_resolver() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hosts");
        text::append_line(&path, "# comment").unwrap();
        text::append_line(&path, "10.9.8.7   build-box  build").unwrap();

        let resolver = HostsFileResolver::new(&path);
        assert_eq!(
            resolver.reverse(Ipv4Addr::new(10, 9, 8, 7)).as_deref(),
            Some("build-box")
        );
        assert_eq!(resolver.reverse(Ipv4Addr::new(1, 1, 1, 1)), None);
    }
}

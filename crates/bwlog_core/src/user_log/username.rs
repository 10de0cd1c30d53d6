//! Uid to username resolution for naming user log directories.

use bwlog_storage::text;
use std::path::PathBuf;

/// Looks up account names.
pub trait UsernameResolver: Send + Sync {
    /// Returns the account name of `uid`, if known.
    fn username(&self, uid: u16) -> Option<String>;
}

impl<F> UsernameResolver for F
where
    F: Fn(u16) -> Option<String> + Send + Sync,
{
    fn username(&self, uid: u16) -> Option<String> {
        self(uid)
    }
}

/// Reads a passwd(5) file.
#[derive(Debug, Clone)]
pub struct PasswdResolver {
    path: PathBuf,
}

impl Default for PasswdResolver {
    fn default() -> Self {
        Self::new("/etc/passwd")
    }
}

impl PasswdResolver {
    /// Creates a resolver reading `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl UsernameResolver for PasswdResolver {
    fn username(&self, uid: u16) -> Option<String> {
        let lines = text::read_lines(&self.path).ok()?;
        lines.iter().find_map(|line| {
            let mut fields = line.split(':');
            let name = fields.next()?;
            let entry_uid: u16 = fields.nth(1)?.parse().ok()?;
            (entry_uid == uid && !name.is_empty()).then(|| name.to_string())
        })
    }
}

/// Returns the directory name for `uid`'s log.
///
/// Uid 0 is always `root`; an unknown uid is named by its number.
pub fn resolve_username(resolver: &dyn UsernameResolver, uid: u16) -> String {
    if uid == 0 {
        return "root".to_string();
    }
    resolver.username(uid).unwrap_or_else(|| {
        tracing::warn!(uid, "no account name for uid, using the number");
        uid.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn passwd_lookup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passwd");
        text::append_line(&path, "root:x:0:0:root:/root:/bin/bash").unwrap();
        text::append_line(&path, "alice:x:1001:1001::/home/alice:/bin/sh").unwrap();
        text::append_line(&path, "broken line").unwrap();

        let resolver = PasswdResolver::new(&path);
        assert_eq!(resolver.username(1001).as_deref(), Some("alice"));
        assert_eq!(resolver.username(1002), None);
    }

    #[test]
    fn root_and_fallback() {
        let nobody = |_: u16| None;
        assert_eq!(resolve_username(&nobody, 0), "root");
        assert_eq!(resolve_username(&nobody, 1234), "1234");

        let named = |uid: u16| Some(format!("user{uid}"));
        assert_eq!(resolve_username(&named, 7), "user7");
    }
}

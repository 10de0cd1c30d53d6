//! The optional TOML configuration file.
//!
//! ```toml
//! [message_logger]
//! logdir = "logs"      # relative to this file
//! segment_size = 100   # MiB
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised before a log root is opened.
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    ReadConfig {
        /// The config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("invalid config {}: {source}", path.display())]
    ParseConfig {
        /// The config file.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// Neither `--path` nor a config `logdir` named a root.
    #[error("no log root given: pass --path or set message_logger.logdir in --config")]
    NoRoot,

    /// A command-line value could not be parsed.
    #[error("invalid {what}: {value:?}")]
    InvalidArgument {
        /// Which argument.
        what: &'static str,
        /// The offending value.
        value: String,
    },
}

/// `[message_logger]` table.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct MessageLoggerConfig {
    /// Log root directory.
    pub logdir: Option<PathBuf>,
    /// Segment budget in MiB.
    pub segment_size: Option<u64>,
}

/// Parsed configuration file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Message logger settings.
    pub message_logger: MessageLoggerConfig,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl FileConfig {
    /// Loads `path`.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&text).map_err(|source| CliError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// The log root, resolved against the config file's directory.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.message_logger
            .logdir
            .as_ref()
            .map(|dir| self.base_dir.join(dir))
    }

    /// Segment budget in bytes.
    pub fn segment_size_bytes(&self) -> u64 {
        self.message_logger
            .segment_size
            .unwrap_or(bwlog_core::DEFAULT_SEGMENT_SIZE_MB)
            << 20
    }
}

/// Picks the root: `--path` first, then the config file.
pub fn resolve_root(path: Option<PathBuf>, config: &FileConfig) -> Result<PathBuf, CliError> {
    path.or_else(|| config.log_dir()).ok_or(CliError::NoRoot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn relative_logdir_follows_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bwlog.toml");
        std::fs::write(&path, "[message_logger]\nlogdir = \"logs\"\nsegment_size = 2\n").unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.log_dir(), Some(dir.path().join("logs")));
        assert_eq!(config.segment_size_bytes(), 2 << 20);
    }

    #[test]
    fn absolute_logdir_and_defaults() {
        let config = FileConfig::parse("[message_logger]\nlogdir = \"/var/log/bw\"\n").unwrap();
        assert_eq!(config.log_dir(), Some(PathBuf::from("/var/log/bw")));
        assert_eq!(config.segment_size_bytes(), 100 << 20);

        let empty = FileConfig::parse("").unwrap();
        assert!(empty.log_dir().is_none());
    }

    #[test]
    fn flag_wins_over_file() {
        let config = FileConfig::parse("[message_logger]\nlogdir = \"/a\"\n").unwrap();
        let root = resolve_root(Some(PathBuf::from("/b")), &config).unwrap();
        assert_eq!(root, PathBuf::from("/b"));
        assert!(matches!(
            resolve_root(None, &FileConfig::default()),
            Err(CliError::NoRoot)
        ));
    }

    #[test]
    fn unknown_types_rejected() {
        assert!(FileConfig::parse("[message_logger]\nsegment_size = \"big\"\n").is_err());
    }
}

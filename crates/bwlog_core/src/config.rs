//! Log root configuration.

/// Default segment size in MiB before a user's active segment is rolled.
pub const DEFAULT_SEGMENT_SIZE_MB: u64 = 100;

/// Configuration for opening a log root writer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the root directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Byte budget of one segment (entries plus args) before it is rolled.
    pub max_segment_size: u64,

    /// Whether every accepted message is also rendered to stdout.
    pub write_to_stdout: bool,

    /// Value written to (and expected in) the root's `version` file.
    pub format_version: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_segment_size: DEFAULT_SEGMENT_SIZE_MB << 20,
            write_to_stdout: false,
            format_version: crate::LOG_FORMAT_VERSION,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the root directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the segment byte budget.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the segment budget in MiB.
    #[must_use]
    pub const fn max_segment_size_mb(mut self, mb: u64) -> Self {
        self.max_segment_size = mb << 20;
        self
    }

    /// Sets whether accepted messages are echoed to stdout.
    #[must_use]
    pub const fn write_to_stdout(mut self, value: bool) -> Self {
        self.write_to_stdout = value;
        self
    }

    /// Sets the layout version written to a new root.
    #[must_use]
    pub const fn format_version(mut self, version: u32) -> Self {
        self.format_version = version;
        self
    }
}

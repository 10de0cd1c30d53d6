//! Test fixtures and log root helpers.
//!
//! Provides a temporary log root whose writer stamps entries from a
//! [`ManualClock`] and names hosts and users without touching `/etc`.

use bwlog_core::segment::Appended;
use bwlog_core::{
    Address, Config, LogMessage, LogRootReader, LogRootWriter, LogTime, ManualClock, WriterEnv,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Time the test clock starts at: 2023-11-14 22:13:20 UTC.
pub const TEST_EPOCH: LogTime = LogTime::new(1_700_000_000, 0);

/// Default sender address, `10.0.0.1:20000`.
pub const TEST_ADDRESS: Address = Address::new(0x0a00_0001, 20000);

/// Lookups that never touch the system: `10.0.0.N` is `hostN`, uid `U` is
/// `userU`.
pub fn test_env(clock: &ManualClock) -> WriterEnv {
    WriterEnv {
        clock: Arc::new(clock.clone()),
        hosts: Box::new(|ip: std::net::Ipv4Addr| Some(format!("host{}", ip.octets()[3]))),
        users: Box::new(|uid: u16| Some(format!("user{uid}"))),
    }
}

/// Builds a [`LogMessage`].
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    message: LogMessage,
}

impl MessageBuilder {
    /// A priority 2 `cellapp` message from [`TEST_ADDRESS`], pid 100.
    pub fn new(uid: u16, format: &str) -> Self {
        Self {
            message: LogMessage {
                address: TEST_ADDRESS,
                uid,
                pid: 100,
                version: 7,
                component_name: "cellapp".to_string(),
                priority: 2,
                format: format.to_string(),
                args: Vec::new(),
            },
        }
    }

    /// Sets the argument stream.
    pub fn args(mut self, args: Vec<u8>) -> Self {
        self.message.args = args;
        self
    }

    /// Sets the sender address.
    pub fn address(mut self, address: Address) -> Self {
        self.message.address = address;
        self
    }

    /// Sets the process id.
    pub fn pid(mut self, pid: i32) -> Self {
        self.message.pid = pid;
        self
    }

    /// Sets the process type.
    pub fn component(mut self, name: &str) -> Self {
        self.message.component_name = name.to_string();
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: u8) -> Self {
        self.message.priority = priority;
        self
    }

    /// Sets the protocol version.
    pub fn version(mut self, version: u8) -> Self {
        self.message.version = version;
        self
    }

    /// Finishes the message.
    pub fn build(self) -> LogMessage {
        self.message
    }
}

/// A log root in a temporary directory.
pub struct TestLogRoot {
    writer: Option<LogRootWriter>,
    /// The clock the writer stamps entries with.
    pub clock: ManualClock,
    config: Config,
    temp_dir: TempDir,
}

impl TestLogRoot {
    /// Creates a root with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a root with custom configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let clock = ManualClock::new(TEST_EPOCH);
        let writer = LogRootWriter::open_with(temp_dir.path(), config.clone(), test_env(&clock))
            .expect("Failed to open log root");
        Self {
            writer: Some(writer),
            clock,
            config,
            temp_dir,
        }
    }

    /// The root directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The writer, reopening it if it was closed.
    pub fn writer(&mut self) -> &mut LogRootWriter {
        let path = self.temp_dir.path();
        let (config, clock) = (&self.config, &self.clock);
        self.writer.get_or_insert_with(|| {
            LogRootWriter::open_with(path, config.clone(), test_env(clock))
                .expect("Failed to reopen log root")
        })
    }

    /// Drops the writer, releasing the root.
    pub fn close_writer(&mut self) {
        self.writer = None;
    }

    /// Writes a message.
    pub fn send(&mut self, message: &LogMessage) -> Appended {
        self.writer()
            .add_log_message(message)
            .expect("Failed to add log message")
    }

    /// Writes a default message for `uid`.
    pub fn log(&mut self, uid: u16, format: &str, args: Vec<u8>) -> Appended {
        let message = MessageBuilder::new(uid, format).args(args).build();
        self.send(&message)
    }

    /// Advances the clock.
    pub fn advance(&self, millis: u64) {
        self.clock.advance_millis(millis);
    }

    /// Current clock reading.
    pub fn now(&self) -> LogTime {
        bwlog_core::Clock::now(&self.clock)
    }

    /// Opens a reader on the root.
    pub fn reader(&self) -> LogRootReader {
        LogRootReader::open(self.temp_dir.path()).expect("Failed to open reader")
    }
}

impl Default for TestLogRoot {
    fn default() -> Self {
        Self::new()
    }
}

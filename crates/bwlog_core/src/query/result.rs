//! Query results and their text rendering.

use crate::types::{EntryAddress, LogTime, MessagePriority};
use std::fmt::{self, Write};
use std::ops::BitOr;

/// Which columns [`QueryResult::format`] prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayFlags(u32);

impl DisplayFlags {
    /// Date, e.g. `Thu 09 Nov 2006`.
    pub const DATE: Self = Self(1 << 0);
    /// Time with milliseconds.
    pub const TIME: Self = Self(1 << 1);
    /// Sending host.
    pub const HOST: Self = Self(1 << 2);
    /// Owning user.
    pub const USER: Self = Self(1 << 3);
    /// Process id.
    pub const PID: Self = Self(1 << 4);
    /// App instance id.
    pub const APPID: Self = Self(1 << 5);
    /// Process type name.
    pub const PROCS: Self = Self(1 << 6);
    /// Priority name.
    pub const SEVERITY: Self = Self(1 << 7);
    /// The message.
    pub const MESSAGE: Self = Self(1 << 8);

    /// No columns.
    pub const NONE: Self = Self(0);
    /// Every column.
    pub const ALL: Self = Self((1 << 9) - 1);

    /// Returns whether every column in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Parses a column name such as `host` or `severity`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "date" => Self::DATE,
            "time" => Self::TIME,
            "host" => Self::HOST,
            "user" => Self::USER,
            "pid" => Self::PID,
            "appid" => Self::APPID,
            "procs" | "component" => Self::PROCS,
            "severity" | "priority" => Self::SEVERITY,
            "message" => Self::MESSAGE,
            "all" => Self::ALL,
            _ => return None,
        })
    }
}

impl Default for DisplayFlags {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for DisplayFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One entry of a query, with every id resolved to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// When the entry was written.
    pub time: LogTime,
    /// Sending host.
    pub host: String,
    /// Owning user.
    pub username: String,
    /// Sending process id.
    pub pid: i32,
    /// App instance id of the sender.
    pub app_id: i32,
    /// Process type name.
    pub component: String,
    /// Raw priority.
    pub priority: u8,
    /// Rendered message.
    pub message: String,
    /// Where the entry lives.
    pub address: EntryAddress,
    /// Offset of the format string in the catalog.
    pub string_offset: u32,
}

impl QueryResult {
    /// Renders the selected columns as one line.
    ///
    /// A multi-line message has its later lines indented to line up under
    /// the first. One trailing newline is dropped.
    #[must_use]
    pub fn format(&self, flags: DisplayFlags) -> String {
        let mut out = String::new();

        let local = self.time.to_local();
        if flags.contains(DisplayFlags::DATE) {
            match local {
                Some(dt) => {
                    let _ = write!(out, "{} ", dt.format("%a %d %b %Y"));
                }
                None => out.push_str("??? ?? ??? ???? "),
            }
        }
        if flags.contains(DisplayFlags::TIME) {
            match local {
                Some(dt) => {
                    let _ = write!(out, "{} ", dt.format("%H:%M:%S%.3f"));
                }
                None => {
                    let _ = write!(out, "{} ", self.time);
                }
            }
        }
        if flags.contains(DisplayFlags::HOST) {
            let _ = write!(out, "{:<15} ", self.host);
        }
        if flags.contains(DisplayFlags::USER) {
            let _ = write!(out, "{:<10} ", self.username);
        }
        if flags.contains(DisplayFlags::PID) {
            let _ = write!(out, "{:<5} ", self.pid);
        }
        if flags.contains(DisplayFlags::APPID) {
            let _ = write!(out, "{:<3} ", self.app_id);
        }
        if flags.contains(DisplayFlags::PROCS) {
            let _ = write!(out, "{:<10} ", self.component);
        }
        if flags.contains(DisplayFlags::SEVERITY) {
            let _ = write!(out, "{:>8}: ", MessagePriority::name_of(self.priority));
        }

        if flags.contains(DisplayFlags::MESSAGE) {
            let indent = " ".repeat(out.chars().count());
            let message = self.message.strip_suffix('\n').unwrap_or(&self.message);
            for (i, line) in message.split('\n').enumerate() {
                if i > 0 {
                    out.push('\n');
                    out.push_str(&indent);
                }
                out.push_str(line);
            }
        } else {
            let len = out.trim_end().len();
            out.truncate(len);
        }
        out
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(DisplayFlags::default()))
    }
}

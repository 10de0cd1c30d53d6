//! Core type definitions for bwlog.

use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};

/// A log timestamp with millisecond resolution.
///
/// Ordering is total: seconds first, then milliseconds. [`LogTime::BEGIN`]
/// and [`LogTime::END`] bracket every real timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LogTime {
    /// Seconds since the Unix epoch.
    pub secs: i64,
    /// Milliseconds within the second (0..1000).
    pub millis: u16,
}

impl LogTime {
    /// The earliest representable time.
    pub const BEGIN: Self = Self { secs: 0, millis: 0 };

    /// The latest representable time.
    pub const END: Self = Self {
        secs: i64::MAX,
        millis: 999,
    };

    /// Creates a time, carrying excess milliseconds into seconds.
    #[must_use]
    pub const fn new(secs: i64, millis: u16) -> Self {
        Self {
            secs: secs + (millis / 1000) as i64,
            millis: millis % 1000,
        }
    }

    /// Converts fractional seconds, rounding to the nearest millisecond.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs >= i64::MAX as f64 {
            return Self::END;
        }
        if secs <= 0.0 {
            return Self::BEGIN;
        }
        let total_millis = (secs * 1000.0).round() as i64;
        Self {
            secs: total_millis / 1000,
            millis: (total_millis % 1000) as u16,
        }
    }

    /// Returns the time as fractional seconds.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.secs as f64 + f64::from(self.millis) / 1000.0
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: elapsed.as_secs() as i64,
            millis: elapsed.subsec_millis() as u16,
        }
    }

    /// Returns the time one millisecond earlier, saturating at [`LogTime::BEGIN`].
    #[must_use]
    pub fn pred(self) -> Self {
        if self == Self::BEGIN {
            self
        } else if self.millis == 0 {
            Self {
                secs: self.secs - 1,
                millis: 999,
            }
        } else {
            Self {
                secs: self.secs,
                millis: self.millis - 1,
            }
        }
    }

    /// Returns the time `millis` later, saturating at [`LogTime::END`].
    #[must_use]
    pub fn add_millis(self, millis: u64) -> Self {
        let total = u64::from(self.millis) + millis;
        let secs = self.secs.saturating_add((total / 1000) as i64);
        if secs == i64::MAX {
            return Self::END;
        }
        Self {
            secs,
            millis: (total % 1000) as u16,
        }
    }

    /// Returns whether this is one of the two sentinels.
    #[must_use]
    pub fn is_sentinel(self) -> bool {
        self == Self::BEGIN || self == Self::END
    }

    /// Converts to a local date-time, if representable.
    #[must_use]
    pub fn to_local(self) -> Option<DateTime<Local>> {
        Local
            .timestamp_opt(self.secs, u32::from(self.millis) * 1_000_000)
            .earliest()
    }
}

impl fmt::Display for LogTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::END {
            return write!(f, "END");
        }
        write!(f, "{}.{:03}", self.secs, self.millis)
    }
}

/// Scan direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Oldest entry first.
    #[default]
    Forwards,
    /// Newest entry first.
    Backwards,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Forwards => Self::Backwards,
            Self::Backwards => Self::Forwards,
        }
    }

    /// Returns `1` for forwards and `-1` for backwards.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Forwards => 1,
            Self::Backwards => -1,
        }
    }
}

/// Network address of a logging process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address {
    /// IPv4 address in host order.
    pub ip: u32,
    /// UDP/TCP port.
    pub port: u16,
}

impl Address {
    /// Creates an address.
    #[must_use]
    pub const fn new(ip: u32, port: u16) -> Self {
        Self { ip, port }
    }

    /// Creates an address from an IPv4 address and port.
    #[must_use]
    pub fn from_ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip: u32::from(ip),
            port,
        }
    }

    /// Returns the IPv4 part.
    #[must_use]
    pub fn ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ipv4(), self.port)
    }
}

/// Stable locator of one log entry: segment suffix plus index in that segment.
///
/// Valid for as long as the segment exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryAddress {
    /// Suffix of the segment holding the entry.
    pub suffix: String,
    /// Index of the entry within the segment.
    pub index: u32,
}

impl EntryAddress {
    /// Creates an entry address.
    #[must_use]
    pub fn new(suffix: impl Into<String>, index: u32) -> Self {
        Self {
            suffix: suffix.into(),
            index,
        }
    }
}

impl fmt::Display for EntryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.suffix, self.index)
    }
}

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessagePriority {
    /// Very verbose tracing.
    Trace = 0,
    /// Debugging output.
    Debug = 1,
    /// Informational.
    Info = 2,
    /// Significant but normal.
    Notice = 3,
    /// Something looks wrong.
    Warning = 4,
    /// Something failed.
    Error = 5,
    /// The process is in trouble.
    Critical = 6,
    /// Temporary developer output.
    Hack = 7,
    /// Output from scripts.
    Script = 8,
    /// Asset pipeline output.
    Asset = 9,
}

impl MessagePriority {
    /// Number of defined priorities.
    pub const COUNT: u8 = 10;

    /// Converts a raw priority byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Notice,
            4 => Self::Warning,
            5 => Self::Error,
            6 => Self::Critical,
            7 => Self::Hack,
            8 => Self::Script,
            9 => Self::Asset,
            _ => return None,
        })
    }

    /// Returns the upper-case display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
            Self::Hack => "HACK",
            Self::Script => "SCRIPT",
            Self::Asset => "ASSET",
        }
    }

    /// Returns the display name of a raw priority byte.
    #[must_use]
    pub fn name_of(value: u8) -> &'static str {
        Self::from_u8(value).map_or("UNKNOWN", Self::name)
    }

    /// Parses a display name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        (0..Self::COUNT)
            .filter_map(Self::from_u8)
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_time_ordering() {
        assert!(LogTime::BEGIN < LogTime::new(10, 0));
        assert!(LogTime::new(10, 0) < LogTime::new(10, 500));
        assert!(LogTime::new(10, 999) < LogTime::new(11, 0));
        assert!(LogTime::new(i64::MAX - 1, 0) < LogTime::END);
    }

    #[test]
    fn log_time_from_f64() {
        assert_eq!(LogTime::from_secs_f64(10.5), LogTime::new(10, 500));
        assert_eq!(LogTime::from_secs_f64(10.2), LogTime::new(10, 200));
        assert_eq!(LogTime::from_secs_f64(f64::INFINITY), LogTime::END);
        assert_eq!(LogTime::from_secs_f64(-3.0), LogTime::BEGIN);
        assert!((LogTime::new(11, 250).as_secs_f64() - 11.25).abs() < 1e-9);
    }

    #[test]
    fn log_time_new_carries() {
        assert_eq!(LogTime::new(1, 1500), LogTime { secs: 2, millis: 500 });
    }

    #[test]
    fn log_time_pred() {
        assert_eq!(LogTime::new(10, 0).pred(), LogTime::new(9, 999));
        assert_eq!(LogTime::new(10, 5).pred(), LogTime::new(10, 4));
        assert_eq!(LogTime::BEGIN.pred(), LogTime::BEGIN);
    }

    #[test]
    fn log_time_add_millis() {
        assert_eq!(LogTime::new(10, 900).add_millis(200), LogTime::new(11, 100));
        assert_eq!(LogTime::END.add_millis(5), LogTime::END);
    }

    #[test]
    fn log_time_display() {
        assert_eq!(LogTime::new(10, 5).to_string(), "10.005");
        assert_eq!(LogTime::END.to_string(), "END");
    }

    #[test]
    fn direction_helpers() {
        assert_eq!(Direction::Forwards.reversed(), Direction::Backwards);
        assert_eq!(Direction::Backwards.sign(), -1);
    }

    #[test]
    fn address_display() {
        let addr = Address::from_ipv4(Ipv4Addr::new(10, 0, 0, 7), 20013);
        assert_eq!(addr.to_string(), "10.0.0.7:20013");
        assert_eq!(addr.ipv4(), Ipv4Addr::new(10, 0, 0, 7));
    }

    #[test]
    fn priority_names() {
        assert_eq!(MessagePriority::name_of(4), "WARNING");
        assert_eq!(MessagePriority::name_of(200), "UNKNOWN");
        assert_eq!(
            MessagePriority::from_name("error"),
            Some(MessagePriority::Error)
        );
        assert_eq!(MessagePriority::from_name("nope"), None);
    }
}

//! Query parameters and the compiled filters derived from them.

use super::range::QueryBound;
use crate::error::{CoreError, CoreResult};
use crate::root::Catalogs;
use crate::types::{Direction, EntryAddress, LogTime};
use regex::Regex;

/// What the include and exclude patterns are matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchTarget {
    /// The rendered message.
    #[default]
    Message,
    /// The format string before interpolation. Much cheaper: entries can be
    /// rejected without reading their arguments.
    FormatString,
}

/// What to look for in one user's log.
///
/// Zero-valued ids and all-ones masks mean "any".
///
/// ```rust
/// use bwlog_core::{Direction, LogTime, QueryParams};
///
/// let params = QueryParams::new(1000)
///     .start_time(LogTime::new(1_700_000_000, 0))
///     .pid(4242)
///     .include("spaces")
///     .direction(Direction::Backwards)
///     .context_lines(2);
/// assert_eq!(params.pid, 4242);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    /// Whose log to search.
    pub uid: u16,
    /// Start bound.
    pub start: QueryBound,
    /// End bound.
    pub end: QueryBound,
    /// Only entries from this host (name or dotted quad).
    pub host: Option<String>,
    /// Only entries from this process id.
    pub pid: i32,
    /// Only entries from this app instance id.
    pub app_id: i32,
    /// Bitmask of accepted process type ids.
    pub process_type_mask: i32,
    /// Bitmask of accepted priorities.
    pub priority_mask: i32,
    /// Only entries matching this pattern.
    pub include: Option<String>,
    /// No entries matching this pattern.
    pub exclude: Option<String>,
    /// What the patterns apply to.
    pub match_target: MatchTarget,
    /// Scan order.
    pub direction: Direction,
    /// Non-matching entries to show on each side of a match.
    pub context_lines: usize,
}

impl QueryParams {
    /// Matches everything in `uid`'s log, oldest first.
    #[must_use]
    pub fn new(uid: u16) -> Self {
        Self {
            uid,
            start: QueryBound::Time(LogTime::BEGIN),
            end: QueryBound::Time(LogTime::END),
            host: None,
            pid: 0,
            app_id: 0,
            process_type_mask: -1,
            priority_mask: -1,
            include: None,
            exclude: None,
            match_target: MatchTarget::Message,
            direction: Direction::Forwards,
            context_lines: 0,
        }
    }

    /// Starts at `time`, inclusive.
    #[must_use]
    pub fn start_time(mut self, time: LogTime) -> Self {
        self.start = QueryBound::Time(time);
        self
    }

    /// Ends before `time`.
    #[must_use]
    pub fn end_time(mut self, time: LogTime) -> Self {
        self.end = QueryBound::Time(time);
        self
    }

    /// Starts at `address`, inclusive.
    #[must_use]
    pub fn start_address(mut self, address: EntryAddress) -> Self {
        self.start = QueryBound::Address(address);
        self
    }

    /// Ends at `address`, inclusive.
    #[must_use]
    pub fn end_address(mut self, address: EntryAddress) -> Self {
        self.end = QueryBound::Address(address);
        self
    }

    /// Filters by host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Filters by process id.
    #[must_use]
    pub fn pid(mut self, pid: i32) -> Self {
        self.pid = pid;
        self
    }

    /// Filters by app instance id.
    #[must_use]
    pub fn app_id(mut self, app_id: i32) -> Self {
        self.app_id = app_id;
        self
    }

    /// Filters by process type bitmask.
    #[must_use]
    pub fn process_types(mut self, mask: i32) -> Self {
        self.process_type_mask = mask;
        self
    }

    /// Filters by priority bitmask.
    #[must_use]
    pub fn priorities(mut self, mask: i32) -> Self {
        self.priority_mask = mask;
        self
    }

    /// Keeps only entries matching `pattern`.
    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include = Some(pattern.into());
        self
    }

    /// Drops entries matching `pattern`.
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude = Some(pattern.into());
        self
    }

    /// Sets what the patterns apply to.
    #[must_use]
    pub fn match_target(mut self, target: MatchTarget) -> Self {
        self.match_target = target;
        self
    }

    /// Sets the scan order.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the number of context entries around each match.
    #[must_use]
    pub fn context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }
}

/// Returns whether bit `value` is set in `mask`.
fn mask_has(mask: i32, value: u8) -> bool {
    1u32.checked_shl(u32::from(value))
        .is_some_and(|bit| (mask as u32) & bit != 0)
}

/// Compiled form of [`QueryParams`]' filters.
#[derive(Debug, Clone)]
pub struct QueryFilters {
    address: u32,
    pid: i32,
    app_id: i32,
    process_type_mask: i32,
    priority_mask: i32,
    include: Option<Regex>,
    exclude: Option<Regex>,
    target: MatchTarget,
}

impl QueryFilters {
    /// Compiles the filters of `params`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownHost` if the host is neither a dotted quad nor in the
    /// hostname catalog, or `InvalidRegex` if a pattern fails to compile.
    pub fn compile(params: &QueryParams, catalogs: &Catalogs) -> CoreResult<Self> {
        let address = match &params.host {
            None => 0,
            Some(host) => catalogs
                .addr_by_host(host)
                .ok_or_else(|| CoreError::UnknownHost { host: host.clone() })?,
        };
        Ok(Self {
            address,
            pid: params.pid,
            app_id: params.app_id,
            process_type_mask: params.process_type_mask,
            priority_mask: params.priority_mask,
            include: params.include.as_deref().map(Regex::new).transpose()?,
            exclude: params.exclude.as_deref().map(Regex::new).transpose()?,
            target: params.match_target,
        })
    }

    /// What the patterns apply to.
    #[must_use]
    pub fn target(&self) -> MatchTarget {
        self.target
    }

    /// Returns whether any pattern is set.
    #[must_use]
    pub fn has_patterns(&self) -> bool {
        self.include.is_some() || self.exclude.is_some()
    }

    /// Host filter.
    #[must_use]
    pub fn validate_address(&self, ip: u32) -> bool {
        self.address == 0 || self.address == ip
    }

    /// Pid filter.
    #[must_use]
    pub fn validate_pid(&self, pid: i32) -> bool {
        self.pid == 0 || self.pid == pid
    }

    /// App instance filter.
    #[must_use]
    pub fn validate_app_id(&self, app_id: i32) -> bool {
        self.app_id == 0 || self.app_id == app_id
    }

    /// Process type filter.
    #[must_use]
    pub fn validate_process_type(&self, type_id: u8) -> bool {
        self.process_type_mask == -1 || mask_has(self.process_type_mask, type_id)
    }

    /// Priority filter.
    #[must_use]
    pub fn validate_message_priority(&self, priority: u8) -> bool {
        self.priority_mask == -1 || mask_has(self.priority_mask, priority)
    }

    /// Include pattern; passes when unset.
    #[must_use]
    pub fn validate_include_regex(&self, text: &str) -> bool {
        self.include.as_ref().map_or(true, |re| re.is_match(text))
    }

    /// Exclude pattern; passes when unset.
    #[must_use]
    pub fn validate_exclude_regex(&self, text: &str) -> bool {
        self.exclude.as_ref().map_or(true, |re| !re.is_match(text))
    }

    /// Both patterns.
    #[must_use]
    pub fn validate_patterns(&self, text: &str) -> bool {
        self.validate_include_regex(text) && self.validate_exclude_regex(text)
    }
}

//! Queries over one user's log.
//!
//! A [`Query`] is an iterator of [`QueryItem`]s. It reads entries between
//! its bounds in scan order, drops those its filters reject, and surrounds
//! matches with context entries when asked to. It can be paused, persisted
//! through [`Query::tell`], and resumed on a log that has since grown.

mod params;
mod range;
mod result;

pub use params::{MatchTarget, QueryFilters, QueryParams};
pub use range::{Position, QueryBound, QueryPosition, QueryRange};
pub use result::{DisplayFlags, QueryResult};

use crate::component::LoggingComponent;
use crate::error::{CoreError, CoreResult};
use crate::format::render_message;
use crate::root::Catalogs;
use crate::segment::LogEntry;
use crate::types::{Direction, EntryAddress};
use crate::user_log::UserLogReader;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// One item yielded by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryItem {
    /// An entry that passed every filter.
    Match(QueryResult),
    /// A neighbour of a match, shown for context.
    Context(QueryResult),
    /// A gap between two runs of context.
    Separator,
}

impl QueryItem {
    /// The entry, unless this is a separator.
    #[must_use]
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Match(r) | Self::Context(r) => Some(r),
            Self::Separator => None,
        }
    }
}

struct TimeoutCheck {
    every: u64,
    callback: Box<dyn FnMut() -> bool + Send>,
}

/// A running query.
///
/// Errors are yielded in place of the entry that caused them; iteration
/// can continue past them.
pub struct Query {
    log: UserLogReader,
    catalogs: Arc<Catalogs>,
    filters: QueryFilters,
    range: QueryRange,
    context_lines: usize,
    pending: VecDeque<CoreResult<QueryItem>>,
    mark: Option<Position>,
    trailing: usize,
    held: Option<Position>,
    scanned: u64,
    timeout: Option<TimeoutCheck>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("user", &self.log.username())
            .field("range", &self.range)
            .field("scanned", &self.scanned)
            .finish_non_exhaustive()
    }
}

impl Query {
    /// Starts a query over `log`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownHost` or `InvalidRegex` if a filter does not
    /// compile, or `InvalidRange` if an address bound names no entry.
    pub fn new(
        log: UserLogReader,
        catalogs: Arc<Catalogs>,
        params: QueryParams,
    ) -> CoreResult<Self> {
        let filters = QueryFilters::compile(&params, &catalogs)?;
        let range = QueryRange::new(&log, params.start, params.end, params.direction)?;
        tracing::debug!(
            user = %log.username(),
            direction = ?range.direction(),
            empty = range.is_empty(),
            "query started"
        );
        Ok(Self {
            log,
            catalogs,
            filters,
            range,
            context_lines: params.context_lines,
            pending: VecDeque::new(),
            mark: None,
            trailing: 0,
            held: None,
            scanned: 0,
            timeout: None,
        })
    }

    /// Calls `callback` every `every` entries scanned. When it returns
    /// `false` the query yields `QueryAborted` before examining the entry
    /// just read; calling `next` again continues the scan from that entry.
    /// An exhausted query never calls it.
    pub fn set_timeout_callback<F>(&mut self, every: u64, callback: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.timeout = Some(TimeoutCheck {
            every: every.max(1),
            callback: Box::new(callback),
        });
    }

    /// The effective scan direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.range.direction()
    }

    /// The bounds and cursor.
    #[must_use]
    pub fn range(&self) -> &QueryRange {
        &self.range
    }

    /// The log being searched.
    #[must_use]
    pub fn log(&self) -> &UserLogReader {
        &self.log
    }

    /// Fraction of the range scanned so far.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.range.progress(&self.log)
    }

    /// Number of entries scanned so far.
    #[must_use]
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// The cursor, for a later [`Query::seek`].
    #[must_use]
    pub fn tell(&self) -> Option<QueryPosition> {
        match self.held {
            Some(held) => self.range.to_query_position(&self.log, held),
            None => self.range.tell(&self.log),
        }
    }

    /// Moves the cursor; see [`QueryRange::seek`]. Pending context is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if `target` is outside the query.
    pub fn seek(&mut self, target: &QueryPosition, post_increment: bool) -> CoreResult<()> {
        self.range.seek(&self.log, target, post_increment)?;
        self.reset_context();
        Ok(())
    }

    /// Moves the cursor one entry toward the end or the beginning.
    pub fn step(&mut self, forward: bool) -> bool {
        let moved = self.range.step(&self.log, forward);
        if moved {
            self.reset_context();
        }
        moved
    }

    fn reset_context(&mut self) {
        self.pending.clear();
        self.mark = None;
        self.trailing = 0;
        self.held = None;
    }

    /// Reloads the log and catalogs and extends the range over anything
    /// appended since.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be reloaded, or `InvalidRange` if
    /// a segment the query was positioned in has been removed.
    pub fn resume(&mut self) -> CoreResult<()> {
        let snapshot = self.range.snapshot(&self.log);
        let mark = self
            .mark
            .and_then(|m| self.range.to_query_position(&self.log, m));
        let held = self
            .held
            .and_then(|h| self.range.to_query_position(&self.log, h));

        self.log.reload_files()?;
        self.catalogs.reload()?;

        self.range.restore(&self.log, snapshot.as_ref())?;
        self.mark = mark.and_then(|m| QueryRange::position_of(&self.log, &m));
        self.held = held.and_then(|h| QueryRange::position_of(&self.log, &h));
        self.range.resume(&self.log)
    }

    /// Only the matches, without context or separators.
    pub fn matches(self) -> impl Iterator<Item = CoreResult<QueryResult>> {
        self.filter_map(|item| match item {
            Ok(QueryItem::Match(result)) => Some(Ok(result)),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        })
    }

    fn check_timeout(&mut self) -> CoreResult<()> {
        self.scanned += 1;
        if let Some(check) = self.timeout.as_mut() {
            if self.scanned % check.every == 0 && !(check.callback)() {
                tracing::debug!(scanned = self.scanned, "query aborted by callback");
                return Err(CoreError::QueryAborted);
            }
        }
        Ok(())
    }

    fn load(&mut self, pos: Position) -> CoreResult<(LogEntry, LoggingComponent)> {
        let entry = self
            .log
            .segment(pos.segment)
            .ok_or_else(|| CoreError::invalid_range(format!("no segment {}", pos.segment)))?
            .read_entry(pos.entry)?;

        if self.log.get_component_by_id(entry.component_id).is_none() {
            self.log.reload_components()?;
        }
        let component = self
            .log
            .get_component_by_id(entry.component_id)
            .cloned()
            .ok_or_else(|| {
                CoreError::component_corruption(format!(
                    "entry {} of segment {} names unknown component {}",
                    pos.entry, pos.segment, entry.component_id
                ))
            })?;
        Ok((entry, component))
    }

    fn passes_header_filters(&self, entry: &LogEntry, component: &LoggingComponent) -> bool {
        let f = &self.filters;
        f.validate_message_priority(entry.priority)
            && f.validate_address(component.address.ip)
            && f.validate_pid(component.pid)
            && f.validate_app_id(component.app_id)
            && f.validate_process_type(component.type_id)
    }

    /// Loads and renders the entry at `pos`, or `None` if a filter rejects
    /// it. With `filtered` unset every entry is rendered.
    fn examine(&mut self, pos: Position, filtered: bool) -> CoreResult<Option<QueryResult>> {
        let (entry, component) = self.load(pos)?;
        if filtered && !self.passes_header_filters(&entry, &component) {
            return Ok(None);
        }

        let format = self.catalogs.format(entry.string_offset)?;
        let patterns = filtered && self.filters.has_patterns();
        if patterns
            && self.filters.target() == MatchTarget::FormatString
            && !self.filters.validate_patterns(&format.text)
        {
            return Ok(None);
        }

        let Some(segment) = self.log.segment(pos.segment) else {
            return Err(CoreError::invalid_range(format!("no segment {}", pos.segment)));
        };
        let args = segment.read_args(&entry)?;
        let message = render_message(&format, &args, component.version)?;
        if patterns
            && self.filters.target() == MatchTarget::Message
            && !self.filters.validate_patterns(&message)
        {
            return Ok(None);
        }

        let ip = component.address.ip;
        Ok(Some(QueryResult {
            time: entry.time,
            host: self
                .catalogs
                .cached_hostname(ip)
                .unwrap_or_else(|| Ipv4Addr::from(ip).to_string()),
            username: self.log.username().to_string(),
            pid: component.pid,
            app_id: component.app_id,
            component: self
                .catalogs
                .component_name(component.type_id)
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            priority: entry.priority,
            message,
            address: EntryAddress::new(segment.suffix(), pos.entry),
            string_offset: entry.string_offset,
        }))
    }

    fn context_item(&mut self, pos: Position) -> CoreResult<QueryItem> {
        match self.examine(pos, false)? {
            Some(result) => Ok(QueryItem::Context(result)),
            None => Err(CoreError::invalid_operation("unfiltered entry was filtered")),
        }
    }

    /// Queues the context before `pos`, `pos` itself, and arms the
    /// trailing context.
    fn queue_match(&mut self, pos: Position, result: QueryResult) {
        let n = self.context_lines;
        if n > 0 {
            let mut before = Vec::with_capacity(n);
            let mut p = pos;
            while before.len() < n {
                let Some(prev) = self.range.step_back_from(&self.log, p) else {
                    break;
                };
                if self.mark.is_some_and(|mark| self.range.precedes(prev, mark)) {
                    break;
                }
                before.push(prev);
                p = prev;
            }
            before.reverse();

            let first = before.first().copied().unwrap_or(pos);
            if self.mark.is_some_and(|mark| mark != first) {
                self.pending.push_back(Ok(QueryItem::Separator));
            }
            for q in before {
                let item = self.context_item(q);
                self.pending.push_back(item);
            }
        }

        self.pending.push_back(Ok(QueryItem::Match(result)));
        self.mark = Some(self.range.increment(&self.log, pos));
        self.trailing = n;
    }
}

impl Iterator for Query {
    type Item = CoreResult<QueryItem>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            let pos = match self.held.take() {
                Some(pos) => pos,
                None => {
                    let pos = self.range.get_next_entry(&self.log)?;
                    if let Err(e) = self.check_timeout() {
                        // Examined on the next call.
                        self.held = Some(pos);
                        return Some(Err(e));
                    }
                    pos
                }
            };

            match self.examine(pos, true) {
                Ok(Some(result)) => self.queue_match(pos, result),
                Ok(None) if self.trailing > 0 => {
                    self.trailing -= 1;
                    self.mark = Some(self.range.increment(&self.log, pos));
                    let item = self.context_item(pos);
                    self.pending.push_back(item);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "unreadable entry");
                    return Some(Err(e));
                }
            }
        }
    }
}

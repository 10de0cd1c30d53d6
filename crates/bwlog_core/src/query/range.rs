//! Query range: sentinel search and the bidirectional cursor.
//!
//! A range holds three positions over a user log's segments: the
//! chronologically earliest (`left`) and latest (`right`) entries inside the
//! bounds, and the cursor `curr`. `begin` and `end` are `left` and `right`
//! in scan order, so backwards scans have `begin == right`.
//!
//! Stepping is direction-relative: "toward end" is chronologically forward
//! for a forwards scan and backward for a backwards one. Everything built on
//! top (progress, context, seek) is written once against that.

use crate::error::{CoreError, CoreResult};
use crate::types::{Direction, EntryAddress, LogTime};
use crate::user_log::UserLogReader;
use std::cmp::Ordering;

/// One end of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBound {
    /// A time. Start bounds are inclusive, end bounds exclusive.
    Time(LogTime),
    /// An exact entry, inclusive.
    Address(EntryAddress),
}

/// A position in a user log.
///
/// `meta` is -1 or +1 when the position sits just before or just after
/// `(segment, entry)`, which happens when the cursor runs off either end of
/// the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Segment index in time order.
    pub segment: usize,
    /// Entry index in the segment.
    pub entry: u32,
    /// Offset past the entry: -1, 0 or +1.
    pub meta: i8,
}

impl Position {
    const fn at(segment: usize, entry: u32) -> Self {
        Self {
            segment,
            entry,
            meta: 0,
        }
    }

    const fn with_meta(self, meta: i8) -> Self {
        Self { meta, ..self }
    }
}

/// A position that survives reloads: the segment is named by suffix.
///
/// This is what [`QueryRange::tell`] hands out and [`QueryRange::seek`]
/// accepts, so a caller can persist a cursor and resume it in a new query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPosition {
    /// Segment suffix.
    pub suffix: String,
    /// Entry index in the segment.
    pub entry: u32,
    /// Offset past the entry: -1, 0 or +1.
    pub meta: i8,
}

impl QueryPosition {
    /// The entry this position refers to.
    #[must_use]
    pub fn address(&self) -> EntryAddress {
        EntryAddress::new(self.suffix.clone(), self.entry)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sentinels {
    left: Position,
    right: Position,
    curr: Position,
}

/// [`Sentinels`] with suffixes instead of indices, kept across a reload.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    left: QueryPosition,
    right: QueryPosition,
    curr: QueryPosition,
}

/// Bounds and cursor of one query over one user log.
#[derive(Debug, Clone)]
pub struct QueryRange {
    direction: Direction,
    start: QueryBound,
    end: QueryBound,
    sentinels: Option<Sentinels>,
}

fn non_empty(log: &UserLogReader, segment: usize) -> bool {
    log.segment(segment).is_some_and(|s| s.num_entries() > 0)
}

fn num_entries(log: &UserLogReader, segment: usize) -> u32 {
    log.segment(segment).map_or(0, |s| s.num_entries())
}

/// Next real entry after `p`, ignoring `meta`.
fn next_entry(log: &UserLogReader, p: Position) -> Option<Position> {
    if p.entry + 1 < num_entries(log, p.segment) {
        return Some(Position::at(p.segment, p.entry + 1));
    }
    (p.segment + 1..log.segment_count())
        .find(|&s| non_empty(log, s))
        .map(|s| Position::at(s, 0))
}

/// Previous real entry before `p`, ignoring `meta`.
fn prev_entry(log: &UserLogReader, p: Position) -> Option<Position> {
    if p.entry > 0 {
        return Some(Position::at(p.segment, p.entry - 1));
    }
    (0..p.segment)
        .rev()
        .find(|&s| non_empty(log, s))
        .map(|s| Position::at(s, num_entries(log, s) - 1))
}

/// Chronological successor; saturates one past the last entry.
fn succ(log: &UserLogReader, p: Position) -> Position {
    match p.meta.cmp(&0) {
        Ordering::Less => p.with_meta(0),
        Ordering::Greater => p,
        Ordering::Equal => next_entry(log, p).unwrap_or(p.with_meta(1)),
    }
}

/// Chronological predecessor; saturates one before the first entry.
fn pred(log: &UserLogReader, p: Position) -> Position {
    match p.meta.cmp(&0) {
        Ordering::Greater => p.with_meta(0),
        Ordering::Less => p,
        Ordering::Equal => prev_entry(log, p).unwrap_or(p.with_meta(-1)),
    }
}

/// Number of entries before `p` in the whole log, plus `meta`.
fn linear_index(log: &UserLogReader, p: Position) -> i64 {
    let before: i64 = (0..p.segment)
        .map(|s| i64::from(num_entries(log, s)))
        .sum();
    before + i64::from(p.entry) + i64::from(p.meta)
}

fn resolve_address(log: &UserLogReader, address: &EntryAddress) -> CoreResult<Position> {
    let segment = log
        .get_segment_index_from_suffix(&address.suffix)
        .ok_or_else(|| CoreError::invalid_range(format!("no segment {}", address.suffix)))?;
    if address.index >= num_entries(log, segment) {
        return Err(CoreError::invalid_range(format!(
            "{address} is past the end of its segment"
        )));
    }
    Ok(Position::at(segment, address.index))
}

fn bound_time(log: &UserLogReader, bound: &QueryBound) -> CoreResult<LogTime> {
    match bound {
        QueryBound::Time(t) => Ok(*t),
        QueryBound::Address(a) => Ok(log.get_entry(a)?.time),
    }
}

/// Earliest entry at or after the start bound.
fn find_left(log: &UserLogReader, bound: &QueryBound) -> CoreResult<Option<Position>> {
    let time = match bound {
        QueryBound::Address(a) => return resolve_address(log, a).map(Some),
        QueryBound::Time(t) => *t,
    };
    for (i, segment) in log.segments().iter().enumerate() {
        if segment.end().is_some_and(|end| end >= time) {
            if let Some(entry) = segment.find_entry_number(time, Direction::Forwards)? {
                return Ok(Some(Position::at(i, entry)));
            }
        }
    }
    Ok(None)
}

/// Latest entry before the end bound (or at it, for an address).
fn find_right(log: &UserLogReader, bound: &QueryBound) -> CoreResult<Option<Position>> {
    let target = match bound {
        QueryBound::Address(a) => return resolve_address(log, a).map(Some),
        QueryBound::Time(t) if *t == LogTime::BEGIN => return Ok(None),
        QueryBound::Time(t) if *t == LogTime::END => LogTime::END,
        QueryBound::Time(t) => t.pred(),
    };
    for (i, segment) in log.segments().iter().enumerate().rev() {
        if segment.start().is_some_and(|start| start <= target) {
            if let Some(entry) = segment.find_entry_number(target, Direction::Backwards)? {
                return Ok(Some(Position::at(i, entry)));
            }
        }
    }
    Ok(None)
}

impl QueryRange {
    /// Resolves `start` and `end` against `log`.
    ///
    /// If `end` precedes `start` the bounds are swapped and the direction
    /// flipped. A range with no entries is not an error.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if an address bound names no entry.
    pub fn new(
        log: &UserLogReader,
        start: QueryBound,
        end: QueryBound,
        direction: Direction,
    ) -> CoreResult<Self> {
        let reversed = match (&start, &end) {
            (QueryBound::Address(a), QueryBound::Address(b)) => {
                resolve_address(log, a)? > resolve_address(log, b)?
            }
            _ => bound_time(log, &start)? > bound_time(log, &end)?,
        };

        let mut range = if reversed {
            tracing::debug!(?start, ?end, "query bounds reversed, flipping direction");
            Self {
                direction: direction.reversed(),
                start: end,
                end: start,
                sentinels: None,
            }
        } else {
            Self {
                direction,
                start,
                end,
                sentinels: None,
            }
        };
        range.sentinels = range.search(log)?;
        Ok(range)
    }

    fn search(&self, log: &UserLogReader) -> CoreResult<Option<Sentinels>> {
        let left = find_left(log, &self.start)?;
        let right = find_right(log, &self.end)?;
        Ok(match (left, right) {
            (Some(left), Some(right)) if left <= right => Some(Sentinels {
                left,
                right,
                curr: match self.direction {
                    Direction::Forwards => left,
                    Direction::Backwards => right,
                },
            }),
            _ => None,
        })
    }

    /// The effective scan direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns whether the range holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sentinels.is_none()
    }

    /// First position in scan order.
    #[must_use]
    pub fn begin(&self) -> Option<Position> {
        self.sentinels.map(|s| match self.direction {
            Direction::Forwards => s.left,
            Direction::Backwards => s.right,
        })
    }

    /// Last position in scan order.
    #[must_use]
    pub fn end(&self) -> Option<Position> {
        self.sentinels.map(|s| match self.direction {
            Direction::Forwards => s.right,
            Direction::Backwards => s.left,
        })
    }

    /// The cursor.
    #[must_use]
    pub fn current(&self) -> Option<Position> {
        self.sentinels.map(|s| s.curr)
    }

    /// One step toward `end`.
    #[must_use]
    pub fn increment(&self, log: &UserLogReader, p: Position) -> Position {
        match self.direction {
            Direction::Forwards => succ(log, p),
            Direction::Backwards => pred(log, p),
        }
    }

    /// One step toward `begin`.
    #[must_use]
    pub fn decrement(&self, log: &UserLogReader, p: Position) -> Position {
        match self.direction {
            Direction::Forwards => pred(log, p),
            Direction::Backwards => succ(log, p),
        }
    }

    /// Returns whether `a` comes before `b` in scan order.
    #[must_use]
    pub fn precedes(&self, a: Position, b: Position) -> bool {
        match self.direction {
            Direction::Forwards => a < b,
            Direction::Backwards => a > b,
        }
    }

    /// Number of steps from `b` to `a` in scan order.
    #[must_use]
    pub fn distance(&self, log: &UserLogReader, a: Position, b: Position) -> i64 {
        self.direction.sign() * (linear_index(log, a) - linear_index(log, b))
    }

    fn is_past_end(&self, p: Position) -> bool {
        self.end().map_or(true, |end| self.precedes(end, p))
    }

    fn is_before_begin(&self, p: Position) -> bool {
        self.begin().map_or(true, |begin| self.precedes(p, begin))
    }

    /// Returns whether `p` lies within `[begin, end]`.
    #[must_use]
    pub fn contains(&self, p: Position) -> bool {
        !self.is_past_end(p) && !self.is_before_begin(p)
    }

    /// Returns the cursor position and advances it, or `None` once the
    /// cursor has passed `end`.
    pub fn get_next_entry(&mut self, log: &UserLogReader) -> Option<Position> {
        let curr = self.current()?;
        if curr.meta != 0 || self.is_past_end(curr) {
            return None;
        }
        let next = self.increment(log, curr);
        if let Some(s) = self.sentinels.as_mut() {
            s.curr = next;
        }
        Some(curr)
    }

    /// Steps from `p` toward `begin`, unless that leaves the range.
    #[must_use]
    pub fn step_back_from(&self, log: &UserLogReader, p: Position) -> Option<Position> {
        let prev = self.decrement(log, p);
        (prev != p && prev.meta == 0 && !self.is_before_begin(prev)).then_some(prev)
    }

    /// Converts a position to its reload-proof form.
    #[must_use]
    pub fn to_query_position(&self, log: &UserLogReader, p: Position) -> Option<QueryPosition> {
        log.segment(p.segment).map(|s| QueryPosition {
            suffix: s.suffix().to_string(),
            entry: p.entry,
            meta: p.meta,
        })
    }

    /// Converts a reload-proof position back, if its entry still exists.
    #[must_use]
    pub fn position_of(log: &UserLogReader, q: &QueryPosition) -> Option<Position> {
        let segment = log.get_segment_index_from_suffix(&q.suffix)?;
        (q.entry < num_entries(log, segment)).then_some(Position {
            segment,
            entry: q.entry,
            meta: q.meta.clamp(-1, 1),
        })
    }

    /// The cursor in reload-proof form.
    #[must_use]
    pub fn tell(&self, log: &UserLogReader) -> Option<QueryPosition> {
        self.to_query_position(log, self.current()?)
    }

    /// Moves the cursor to `target`, then one step toward `end` if
    /// `post_increment`.
    ///
    /// `target` may be any position in `[begin, end]` or the position just
    /// past `end` that an exhausted cursor reports.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRange` if the range is empty or `target` is outside it.
    pub fn seek(
        &mut self,
        log: &UserLogReader,
        target: &QueryPosition,
        post_increment: bool,
    ) -> CoreResult<()> {
        let Some(end) = self.end() else {
            return Err(CoreError::invalid_range("seek in an empty range"));
        };
        let pos = Self::position_of(log, target).ok_or_else(|| {
            CoreError::invalid_range(format!("no entry {}:{}", target.suffix, target.entry))
        })?;

        let past_end = self.increment(log, end);
        if self.is_before_begin(pos) || self.precedes(past_end, pos) {
            return Err(CoreError::invalid_range(format!(
                "{}:{} is outside the query range",
                target.suffix, target.entry
            )));
        }

        let pos = if post_increment {
            self.increment(log, pos)
        } else {
            pos
        };
        if let Some(s) = self.sentinels.as_mut() {
            s.curr = pos;
        }
        Ok(())
    }

    /// Moves the cursor one entry toward `end` (`forward`) or `begin`.
    ///
    /// Returns whether the cursor moved.
    pub fn step(&mut self, log: &UserLogReader, forward: bool) -> bool {
        let Some(curr) = self.current() else {
            return false;
        };
        let next = if forward {
            if self.is_past_end(curr) {
                return false;
            }
            self.increment(log, curr)
        } else {
            let prev = self.decrement(log, curr);
            if prev == curr || self.is_before_begin(prev) {
                return false;
            }
            prev
        };
        if let Some(s) = self.sentinels.as_mut() {
            s.curr = next;
        }
        true
    }

    /// Fraction of the range already scanned, in `0.0..=1.0`.
    #[must_use]
    pub fn progress(&self, log: &UserLogReader) -> f64 {
        let (Some(begin), Some(end), Some(curr)) = (self.begin(), self.end(), self.current())
        else {
            return 1.0;
        };
        let total = self.distance(log, end, begin) + 1;
        let done = self.distance(log, curr, begin);
        (done as f64 / total as f64).clamp(0.0, 1.0)
    }

    pub(crate) fn snapshot(&self, log: &UserLogReader) -> Option<Snapshot> {
        let s = self.sentinels?;
        Some(Snapshot {
            left: self.to_query_position(log, s.left)?,
            right: self.to_query_position(log, s.right)?,
            curr: self.to_query_position(log, s.curr)?,
        })
    }

    /// Re-derives indices after the log's segment list changed.
    pub(crate) fn restore(
        &mut self,
        log: &UserLogReader,
        snapshot: Option<&Snapshot>,
    ) -> CoreResult<()> {
        let Some(snapshot) = snapshot else {
            self.sentinels = None;
            return Ok(());
        };
        let lookup = |q: &QueryPosition| {
            Self::position_of(log, q).ok_or_else(|| {
                CoreError::invalid_range(format!("segment {} removed during query", q.suffix))
            })
        };
        self.sentinels = Some(Sentinels {
            left: lookup(&snapshot.left)?,
            right: lookup(&snapshot.right)?,
            curr: lookup(&snapshot.curr)?,
        });
        Ok(())
    }

    /// Picks up entries appended since the range was built.
    ///
    /// Only the chronologically latest sentinel is recomputed; the cursor
    /// stays where it is, except that a cursor parked just past the old
    /// last entry moves onto the first new one. An empty range is searched
    /// again from scratch.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment cannot be searched.
    pub fn resume(&mut self, log: &UserLogReader) -> CoreResult<()> {
        let Some(mut s) = self.sentinels else {
            self.sentinels = self.search(log)?;
            return Ok(());
        };

        if let Some(right) = find_right(log, &self.end)? {
            if right >= s.left {
                s.right = right;
            }
        }
        if self.direction == Direction::Forwards && s.curr.meta > 0 {
            if let Some(next) = next_entry(log, s.curr) {
                s.curr = next;
            }
        }
        self.sentinels = Some(s);
        Ok(())
    }
}

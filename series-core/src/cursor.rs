use std::fmt;
use std::sync::Arc;

use crate::{
    comparer::KeyComparer,
    series::{FindResult, Lookup, SortedSeries},
};

/// Terminal signal for a cursor that observed a structural change. Carries
/// the last key the cursor saw so callers can resume from a fresh cursor via
/// `move_at(last_key, Gt)` (or `Lt` when walking backwards).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorInvalidated<K> {
    pub last_key: Option<K>,
}

impl<K: fmt::Debug> fmt::Display for CursorInvalidated<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last_key {
            Some(key) => write!(f, "cursor invalidated by a structural change after key {key:?}"),
            None => write!(f, "cursor invalidated by a structural change"),
        }
    }
}

impl<K: fmt::Debug> std::error::Error for CursorInvalidated<K> {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorMode {
    /// Positioned iteration, one entry at a time.
    Point,
    /// The whole sealed series exposed as a single block.
    Batch,
    /// Saw an order-version mismatch; every further move fails.
    Invalid,
}

enum Step<K, V> {
    To(i64, K, V),
    End,
    Invalidated,
}

/// Bidirectional positional iterator over a [`SortedSeries`].
///
/// Every move reads one published epoch of the series and compares its
/// order version against the snapshot taken when the cursor was positioned.
/// Pure tail appends leave that version untouched, so a streaming cursor
/// keeps advancing across concurrent `add_last` calls; any mutation that
/// shifts existing entries invalidates the cursor instead of silently
/// skewing it.
pub struct SeriesCursor<K, V, C> {
    series: Arc<SortedSeries<K, V, C>>,
    /// `-1` before the start; otherwise the current position, or the next
    /// expected position once the end has been observed.
    index: i64,
    at_end: bool,
    mode: CursorMode,
    order_version: u64,
    current: Option<(K, V)>,
    last_key: Option<K>,
    batch_consumed: bool,
}

impl<K: Copy, V: Copy, C: KeyComparer<K>> SeriesCursor<K, V, C> {
    pub(crate) fn new(series: Arc<SortedSeries<K, V, C>>) -> Self {
        let order_version = series.order_version();
        Self {
            series,
            index: -1,
            at_end: false,
            mode: CursorMode::Point,
            order_version,
            current: None,
            last_key: None,
            batch_consumed: false,
        }
    }

    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    pub fn current(&self) -> Option<(K, V)> {
        self.current
    }

    pub fn current_key(&self) -> Option<K> {
        self.current.map(|(k, _)| k)
    }

    pub fn current_value(&self) -> Option<V> {
        self.current.map(|(_, v)| v)
    }

    /// Advances towards the tail. `Ok(false)` at the end; the cursor stays
    /// armed there and picks up later tail appends.
    pub fn move_next(&mut self) -> Result<bool, CursorInvalidated<K>> {
        self.ensure_valid()?;
        let target = if self.at_end { self.index } else { self.index + 1 };
        let expected = self.order_version;
        let step = self.series.read(|s| {
            if s.order_version != expected {
                return Step::Invalidated;
            }
            if (0..s.size as i64).contains(&target) {
                match self.series.entry_at(s, target as u32) {
                    Some((k, v)) => Step::To(target, k, v),
                    None => Step::End,
                }
            } else {
                Step::End
            }
        });
        self.apply_forward(step, target)
    }

    /// Retreats towards the head; from before-start it snaps to the tail.
    /// `Ok(false)` once the front has been passed.
    pub fn move_previous(&mut self) -> Result<bool, CursorInvalidated<K>> {
        self.ensure_valid()?;
        let expected = self.order_version;
        let from_start = self.index < 0;
        let previous = self.index;
        let step = self.series.read(|s| {
            if s.order_version != expected {
                return Step::Invalidated;
            }
            let target = if from_start {
                s.size as i64 - 1
            } else {
                previous - 1
            };
            if (0..s.size as i64).contains(&target) {
                match self.series.entry_at(s, target as u32) {
                    Some((k, v)) => Step::To(target, k, v),
                    None => Step::End,
                }
            } else {
                Step::End
            }
        });
        match step {
            Step::To(index, k, v) => {
                self.position(index, k, v);
                Ok(true)
            }
            Step::End => {
                self.index = -1;
                self.at_end = false;
                self.current = None;
                self.mode = CursorMode::Point;
                Ok(false)
            }
            Step::Invalidated => Err(self.invalidate()),
        }
    }

    /// Jumps to the first entry, taking a fresh order-version snapshot.
    /// `Ok(false)` iff the series is empty.
    pub fn move_first(&mut self) -> Result<bool, CursorInvalidated<K>> {
        self.move_to_edge(true)
    }

    /// Jumps to the last entry, taking a fresh order-version snapshot.
    pub fn move_last(&mut self) -> Result<bool, CursorInvalidated<K>> {
        self.move_to_edge(false)
    }

    /// Positions at the entry selected by `try_find(k, direction)`; a miss
    /// leaves the cursor exactly where it was.
    pub fn move_at(&mut self, k: &K, direction: Lookup) -> Result<bool, CursorInvalidated<K>> {
        self.ensure_valid()?;
        let (result, order_version) = self.series.read(|s| {
            (self.series.find_in(s, k, direction), s.order_version)
        });
        match result {
            FindResult::Found { index, key, value } => {
                self.order_version = order_version;
                self.position(index as i64, key, value);
                Ok(true)
            }
            FindResult::Missing(_) => Ok(false),
        }
    }

    /// On a sealed, non-empty series: positions at the tail and exposes the
    /// whole series as one block. True exactly once per cursor.
    pub fn move_next_batch(&mut self) -> Result<bool, CursorInvalidated<K>> {
        self.ensure_valid()?;
        if self.batch_consumed || !self.series.is_sealed() {
            return Ok(false);
        }
        let entry = self
            .series
            .read(|s| {
                if s.size == 0 {
                    None
                } else {
                    self.series.entry_at(s, s.size - 1).map(|e| (s.size, e))
                }
            });
        let Some((size, (k, v))) = entry else {
            return Ok(false);
        };
        self.order_version = self.series.order_version();
        self.index = size as i64 - 1;
        self.at_end = false;
        self.current = Some((k, v));
        self.last_key = Some(k);
        self.mode = CursorMode::Batch;
        self.batch_consumed = true;
        Ok(true)
    }

    /// The whole sealed series; defined only in batch mode.
    pub fn current_batch(&self) -> Option<Vec<(K, V)>> {
        if self.mode == CursorMode::Batch {
            Some(self.series.to_vec())
        } else {
            None
        }
    }

    pub fn series(&self) -> &Arc<SortedSeries<K, V, C>> {
        &self.series
    }

    fn move_to_edge(&mut self, first: bool) -> Result<bool, CursorInvalidated<K>> {
        self.ensure_valid()?;
        let (order_version, entry) = self.series.read(|s| {
            let order_version = s.order_version;
            let entry = if s.size == 0 {
                None
            } else {
                let index = if first { 0 } else { s.size - 1 };
                self.series.entry_at(s, index).map(|e| (index, e))
            };
            (order_version, entry)
        });
        match entry {
            Some((index, (k, v))) => {
                self.order_version = order_version;
                self.position(index as i64, k, v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn apply_forward(
        &mut self,
        step: Step<K, V>,
        target: i64,
    ) -> Result<bool, CursorInvalidated<K>> {
        match step {
            Step::To(index, k, v) => {
                self.position(index, k, v);
                Ok(true)
            }
            Step::End => {
                self.index = target;
                self.at_end = true;
                self.current = None;
                self.mode = CursorMode::Point;
                Ok(false)
            }
            Step::Invalidated => Err(self.invalidate()),
        }
    }

    fn position(&mut self, index: i64, k: K, v: V) {
        self.index = index;
        self.at_end = false;
        self.current = Some((k, v));
        self.last_key = Some(k);
        self.mode = CursorMode::Point;
    }

    fn ensure_valid(&self) -> Result<(), CursorInvalidated<K>> {
        if self.mode == CursorMode::Invalid {
            Err(CursorInvalidated {
                last_key: self.last_key,
            })
        } else {
            Ok(())
        }
    }

    fn invalidate(&mut self) -> CursorInvalidated<K> {
        self.mode = CursorMode::Invalid;
        self.current = None;
        CursorInvalidated {
            last_key: self.last_key,
        }
    }
}

impl<K: Copy, V: Copy, C: KeyComparer<K>> Clone for SeriesCursor<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            series: Arc::clone(&self.series),
            index: self.index,
            at_end: self.at_end,
            mode: self.mode,
            order_version: self.order_version,
            current: self.current,
            last_key: self.last_key,
            batch_consumed: self.batch_consumed,
        }
    }
}

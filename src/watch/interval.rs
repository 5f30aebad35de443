//! Lazy, windowed readers over the event history.
//!
//! An [`IntervalReader`] covers the logical index range `[start, limit)` fixed at
//! creation. Events are copied out of the history in windows of at most
//! `window_size`, each refill taking the history lock in shared mode only for
//! the copy. Consumers then drain the window without holding any lock.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use super::Event;
use super::EventLog;
use crate::metrics::INVALIDATED_INTERVALS;
use crate::Object;
use crate::Result;

/// Lock-guarded history an interval refills its window from.
pub trait HistorySource<T: Object>: Send + Sync {
    /// Copies up to `max` events starting at `cursor`, bounded by `limit`.
    ///
    /// Fails with `WatchError::Invalidated` when `cursor` was already evicted.
    fn copy_window(
        &self,
        cursor: u64,
        limit: u64,
        max: usize,
        out: &mut VecDeque<Arc<Event<T>>>,
    ) -> Result<usize>;
}

impl<T: Object> HistorySource<T> for RwLock<EventLog<T>> {
    fn copy_window(
        &self,
        cursor: u64,
        limit: u64,
        max: usize,
        out: &mut VecDeque<Arc<Event<T>>>,
    ) -> Result<usize> {
        self.read().copy_window(cursor, limit, max, out)
    }
}

enum Mode<T: Object> {
    /// Reads through to the history on every window refill
    Incremental(Arc<dyn HistorySource<T>>),
    /// Fully materialized at creation
    Snapshot,
}

pub struct IntervalReader<T: Object> {
    mode: Mode<T>,
    /// Next index to copy from the history
    cursor: u64,
    /// Exclusive upper bound, fixed at creation
    limit: u64,
    /// History index a follow-up interval starts from
    resume_index: u64,
    window: VecDeque<Arc<Event<T>>>,
    window_size: usize,
}

impl<T: Object> std::fmt::Debug for IntervalReader<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("IntervalReader")
            .field("snapshot", &self.is_snapshot())
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("buffered", &self.window.len())
            .finish()
    }
}

impl<T: Object> IntervalReader<T> {
    /// Reader over history indices `[start, limit)`.
    ///
    /// Nothing is read until the first `next`; eviction of `start` before then
    /// surfaces at that call.
    pub fn new(
        source: Arc<dyn HistorySource<T>>,
        start: u64,
        limit: u64,
        window_size: usize,
    ) -> Self {
        Self {
            mode: Mode::Incremental(source),
            cursor: start,
            limit,
            resume_index: limit,
            window: VecDeque::with_capacity(window_size.min((limit.saturating_sub(start)) as usize)),
            window_size: window_size.max(1),
        }
    }

    /// Reader over events materialized up front, typically one `Added` per stored
    /// object. `resume_index` is the history position the snapshot is consistent with.
    pub fn snapshot(
        events: Vec<Arc<Event<T>>>,
        resume_index: u64,
    ) -> Self {
        let len = events.len();
        Self {
            mode: Mode::Snapshot,
            cursor: 0,
            limit: 0,
            resume_index,
            window: events.into(),
            window_size: len.max(1),
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.mode, Mode::Snapshot)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn resume_index(&self) -> u64 {
        self.resume_index
    }

    /// Next event, or `None` once the interval is exhausted.
    pub fn next(&mut self) -> Result<Option<Arc<Event<T>>>> {
        if let Some(event) = self.window.pop_front() {
            return Ok(Some(event));
        }
        if self.cursor >= self.limit {
            return Ok(None);
        }

        let Mode::Incremental(source) = &self.mode else {
            return Ok(None);
        };

        match source.copy_window(self.cursor, self.limit, self.window_size, &mut self.window) {
            Ok(copied) => {
                self.cursor += copied as u64;
                Ok(self.window.pop_front())
            }
            Err(e) => {
                INVALIDATED_INTERVALS.inc();
                warn!(cursor = self.cursor, limit = self.limit, "interval invalidated: {}", e);
                Err(e)
            }
        }
    }

    /// Number of events buffered in the local window.
    pub fn buffered(&self) -> usize {
        self.window.len()
    }
}

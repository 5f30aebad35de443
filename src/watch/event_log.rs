//! Bounded, index-addressed history of recent events.
//!
//! Every appended event gets a monotonically increasing logical index. Physical
//! storage is a ring of `capacity` slots; once full, appending evicts the oldest
//! event and advances `oldest_index`.
//!
//! ```text
//!   oldest_index                       next_index
//!        |                                  |
//!        v                                  v
//!   [ e(n-k) | e(n-k+1) | ... | e(n-1) ] (empty)
//! ```
//!
//! The log has no lock of its own. Its owner guards it: writers hold exclusive
//! access for `append`, readers hold shared access while copying out of it.

use std::collections::VecDeque;
use std::sync::Arc;

use super::Event;
use crate::metrics::EVICTED_EVENTS;
use crate::Object;
use crate::Result;
use crate::WatchError;

#[derive(Debug)]
pub struct EventLog<T: Object> {
    slots: Vec<Option<Arc<Event<T>>>>,
    /// Smallest logical index still retained
    oldest_index: u64,
    /// Index the next appended event will receive
    next_index: u64,
}

impl<T: Object> EventLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            oldest_index: 0,
            next_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn oldest_index(&self) -> u64 {
        self.oldest_index
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn len(&self) -> usize {
        (self.next_index - self.oldest_index) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == self.oldest_index
    }

    fn slot(
        &self,
        index: u64,
    ) -> usize {
        (index % self.slots.len() as u64) as usize
    }

    /// Appends `event`, evicting and returning the oldest one when full.
    pub fn append(
        &mut self,
        event: Arc<Event<T>>,
    ) -> Option<Arc<Event<T>>> {
        let evicted = if self.len() == self.capacity() {
            let slot = self.slot(self.oldest_index);
            self.oldest_index += 1;
            EVICTED_EVENTS.inc();
            self.slots[slot].take()
        } else {
            None
        };

        let slot = self.slot(self.next_index);
        self.slots[slot] = Some(event);
        self.next_index += 1;
        evicted
    }

    /// Drops every retained event.
    ///
    /// One index is skipped so that every reader positioned before the reset,
    /// including one that had consumed everything, fails its next refill.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.next_index += 1;
        self.oldest_index = self.next_index;
    }

    /// Event at logical `index`, if still retained.
    pub fn get(
        &self,
        index: u64,
    ) -> Option<&Arc<Event<T>>> {
        if index < self.oldest_index || index >= self.next_index {
            return None;
        }
        self.slots[self.slot(index)].as_ref()
    }

    /// Revision of the oldest retained event.
    pub fn oldest_revision(&self) -> Option<u64> {
        self.get(self.oldest_index).map(|e| e.revision)
    }

    /// Index of the first retained event with a revision above `revision`,
    /// or `next_index` if there is none.
    pub fn first_index_after(
        &self,
        revision: u64,
    ) -> u64 {
        let (mut lo, mut hi) = (self.oldest_index, self.next_index);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.get(mid) {
                Some(event) if event.revision <= revision => lo = mid + 1,
                _ => hi = mid,
            }
        }
        lo
    }

    /// Copies events `[cursor, min(limit, cursor + max))` into `out`.
    ///
    /// Fails with `Invalidated` when `cursor` has already been evicted. Returns
    /// the number of events copied.
    pub fn copy_window(
        &self,
        cursor: u64,
        limit: u64,
        max: usize,
        out: &mut VecDeque<Arc<Event<T>>>,
    ) -> Result<usize> {
        if cursor < self.oldest_index {
            return Err(WatchError::Invalidated {
                cursor,
                oldest: self.oldest_index,
            }
            .into());
        }

        let end = limit.min(self.next_index).min(cursor + max as u64);
        let mut copied = 0;
        for index in cursor..end {
            if let Some(event) = self.get(index) {
                out.push_back(event.clone());
                copied += 1;
            }
        }
        Ok(copied)
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event<T>>> + '_ {
        (self.oldest_index..self.next_index).filter_map(move |index| self.get(index))
    }
}

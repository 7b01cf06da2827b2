//! Bounded history buffers
//!
//! Every cycle pushes one entry to the input buffer and one to the output
//! buffer. Entries keep their absolute index (the number of pushes before
//! them) even after older entries were evicted, so `_in_[n]` and `_out_[n]`
//! keep pointing at the same cycle.

use crate::failure::Failure;
use std::collections::VecDeque;

/// What a cycle produced, as recorded in the output history
#[derive(Debug, Clone, PartialEq)]
pub enum Output<V> {
    /// Neutral entry (session start)
    Nil,
    Value(V),
    Exception(Failure),
}

impl<V> Output<V> {
    pub fn is_exception(&self) -> bool {
        matches!(self, Output::Exception(_))
    }
}

/// Fixed-capacity FIFO buffer
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    entries: VecDeque<T>,
    max_size: usize,
    count: usize,
}

impl<T> HistoryBuffer<T> {
    pub fn new(max_size: usize) -> Self {
        HistoryBuffer {
            entries: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            count: 0,
        }
    }

    /// Append an entry, evicting the oldest one when full
    pub fn push(&mut self, value: T) {
        self.count += 1;
        if self.max_size == 0 {
            return;
        }
        if self.entries.len() == self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(value);
    }

    /// Look up an entry.
    ///
    /// Non-negative indices are absolute (0 is the first entry ever pushed);
    /// negative indices count back from the most recent entry (-1 is the last).
    /// Evicted or not-yet-pushed positions return `None`.
    pub fn get(&self, index: isize) -> Option<&T> {
        let absolute = if index < 0 {
            self.count.checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        let first = self.first_index();
        if absolute < first {
            return None;
        }
        self.entries.get(absolute - first)
    }

    /// Absolute index of the oldest retained entry
    pub fn first_index(&self) -> usize {
        self.count - self.entries.len()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries ever pushed
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Retained entries paired with their absolute index
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &T)> {
        let first = self.first_index();
        self.entries.iter().enumerate().map(move |(i, v)| (first + i, v))
    }
}

impl<T: Clone> HistoryBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

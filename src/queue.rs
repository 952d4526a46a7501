//! Bounded timestamp-ordered queue.
//!
//! The bridge between a base-decoder thread and the core decode thread:
//! a single producer pushes items as they arrive, a single consumer pops
//! them in timestamp order. `push` blocks while the queue is full, `pop`
//! while it is empty; closing wakes the consumer and drains what is
//! left.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

struct Entry<T> {
    timestamp: u64,
    // Arrival order breaks timestamp ties
    sequence: u64,
    value: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.sequence == other.sequence
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.timestamp, self.sequence).cmp(&(other.timestamp, other.sequence))
    }
}

struct State<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_sequence: u64,
    closed: bool,
}

/// Bounded single-producer single-consumer queue ordered by timestamp.
pub struct TimestampQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> TimestampQueue<T> {
    pub fn new(capacity: usize) -> TimestampQueue<T> {
        assert!(capacity > 0);
        TimestampQueue {
            capacity,
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Push one item, blocking while the queue is full. Pushing to a
    /// closed queue drops the item.
    pub fn push(&self, timestamp: u64, value: T) {
        let mut state = self.state.lock().unwrap();
        while state.heap.len() >= self.capacity && !state.closed {
            state = self.not_full.wait(state).unwrap();
        }
        if state.closed {
            return;
        }
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.heap.push(Reverse(Entry {
            timestamp,
            sequence,
            value,
        }));
        drop(state);
        self.not_empty.notify_all();
    }

    /// Pop the earliest item, blocking while the queue is empty.
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(Reverse(entry)) = state.heap.pop() {
                drop(state);
                self.not_full.notify_one();
                return Some(entry.value);
            }
            if state.closed {
                return None;
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Pop without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        let entry = state.heap.pop();
        drop(state);
        if entry.is_some() {
            self.not_full.notify_one();
        }
        entry.map(|Reverse(e)| e.value)
    }

    /// Close the queue: the consumer drains the remaining items, the
    /// producer stops feeding.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

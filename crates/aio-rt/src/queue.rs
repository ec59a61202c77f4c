// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ready queue and timer queue.
//!
//! The ready queue is strict FIFO. The timer queue is a min-heap keyed on
//! `(deadline, sequence)`; the sequence number breaks ties between equal
//! deadlines in insertion order and is never reused.
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::time::Instant;

use crate::scheduler::Continuation;

/// Continuations waiting to run, in submission order.
pub(crate) struct ReadyQueue {
    queue: VecDeque<Continuation>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    pub fn push(&mut self, cont: Continuation) {
        self.queue.push_back(cont);
    }

    pub fn pop(&mut self) -> Option<Continuation> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn drain_all(&mut self) -> Vec<Continuation> {
        self.queue.drain(..).collect()
    }
}

/// A continuation parked until `deadline`.
pub(crate) struct TimerEntry {
    pub deadline: Instant,
    pub sequence: u64,
    pub cont: Continuation,
}

// Ordering ignores the continuation: (deadline, sequence) is already unique.
impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Pending timers, earliest `(deadline, sequence)` first.
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    sequence: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
        }
    }

    /// Insert a timer. Returns the sequence number it was assigned.
    pub fn push(&mut self, deadline: Instant, cont: Continuation) -> u64 {
        self.sequence += 1;
        let sequence = self.sequence;
        self.heap.push(Reverse(TimerEntry {
            deadline,
            sequence,
            cont,
        }));
        sequence
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Pop the earliest timer if its deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerEntry> {
        match self.heap.peek() {
            Some(Reverse(entry)) if entry.deadline <= now => {
                self.heap.pop().map(|Reverse(entry)| entry)
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn drain_all(&mut self) -> Vec<Continuation> {
        self.heap.drain().map(|Reverse(entry)| entry.cont).collect()
    }
}

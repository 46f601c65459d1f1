//! Run-tagged timer queue on a millisecond virtual clock
//!
//! Timers pop in `(due, arm order)` order, so two timers due in the same
//! millisecond fire in the order they were armed.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Identity of one cascade run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

impl RunId {
    /// Process-unique, monotonic id
    pub(crate) fn next() -> Self {
        Self(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Digit starts spinning
    SpinStart { position: usize },
    /// Digit increment loop
    Tick { position: usize },
    /// Digit locks onto its target
    Lock { position: usize },
}

/// One armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub run_id: RunId,
    pub due_ms: u64,
    pub kind: TimerKind,
    seq: u64,
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due_ms, self.seq).cmp(&(other.due_ms, other.seq))
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of timers
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Timer>>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer
    pub fn arm(&mut self, run_id: RunId, due_ms: u64, kind: TimerKind) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Timer {
            run_id,
            due_ms,
            kind,
            seq,
        }));
    }

    /// Pop the earliest timer due at or before `now_ms`
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Timer> {
        match self.heap.peek() {
            Some(Reverse(timer)) if timer.due_ms <= now_ms => self.heap.pop().map(|r| r.0),
            _ => None,
        }
    }

    /// Earliest deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(t)| t.due_ms)
    }

    /// Drop every timer belonging to `run_id`, returning how many were dropped
    pub fn cancel_run(&mut self, run_id: RunId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|Reverse(t)| t.run_id != run_id);
        before - self.heap.len()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

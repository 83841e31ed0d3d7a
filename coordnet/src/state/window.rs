// coordnet/src/state/window.rs
//
// Sliding-window event queue.
//
// Holds the working set of events eligible for comparison, in non-decreasing
// timestamp order (the caller guarantees ordering across pushes). Eviction is
// a prefix trim — O(k) in the number of events dropped.

use std::collections::VecDeque;

use crate::events::Interaction;

#[derive(Debug, Default)]
pub struct WindowQueue {
    events: VecDeque<Interaction>,
}

impl WindowQueue {
    pub fn new() -> Self {
        Self { events: VecDeque::new() }
    }

    /// Append to the tail. Timestamp ordering is a caller invariant.
    pub fn push(&mut self, event: Interaction) {
        self.events.push_back(event);
    }

    /// Drop every event with `ts < cutoff`. Idempotent.
    pub fn evict_before(&mut self, cutoff: i64) {
        while self.events.front().map(|e| e.ts < cutoff).unwrap_or(false) {
            self.events.pop_front();
        }
    }

    /// `(first_ts, last_ts)` of the current contents, or None when empty.
    pub fn span(&self) -> Option<(i64, i64)> {
        match (self.events.front(), self.events.back()) {
            (Some(first), Some(last)) => Some((first.ts, last.ts)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl std::ops::Index<usize> for WindowQueue {
    type Output = Interaction;

    fn index(&self, index: usize) -> &Interaction {
        &self.events[index]
    }
}

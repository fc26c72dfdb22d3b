//! Count-based completion detection.
//!
//! The pipeline never needs to know how many jobs there are. It is drained
//! once every worker has signaled that it stopped, whatever the number of
//! jobs each one handled.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub(crate) struct CompletionCounter {
    expected: usize,
    completed: AtomicUsize,
}

impl CompletionCounter {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            completed: AtomicUsize::new(0),
        }
    }

    /// Record one worker completion.
    ///
    /// Returns true for exactly one caller: the one whose completion makes
    /// the count reach the expected total.
    pub fn record(&self) -> bool {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(completed <= self.expected, "worker completed twice");
        completed == self.expected
    }

    pub fn remaining(&self) -> usize {
        self.expected
            .saturating_sub(self.completed.load(Ordering::Acquire))
    }

    pub fn is_drained(&self) -> bool {
        self.remaining() == 0
    }
}

//! Bounded window of recent samples for the trend chart.

use std::collections::VecDeque;

use crate::models::Sample;

// ---

/// Number of samples kept for trend rendering.
pub const HISTORY_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct HistoryWindow {
    // ---
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::with_capacity(HISTORY_LEN)
    }
}

impl HistoryWindow {
    // ---
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, sample: Sample) {
        // ---
        if self.capacity == 0 {
            return;
        }
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

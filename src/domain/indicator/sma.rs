//! Simple moving average over a sliding window.
//!
//! O(1) per update via a running sum. The sum is re-derived from the window
//! once every `period` evictions so float drift stays bounded.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RunningMean {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
    evictions: usize,
}

impl RunningMean {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
            evictions: 0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Feeds one value. Returns the mean once `period` values have been seen.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.window.len() == self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
                self.evictions += 1;
            }
        }
        self.window.push_back(value);
        self.sum += value;

        if self.evictions >= self.period {
            self.sum = self.window.iter().sum();
            self.evictions = 0;
        }

        self.current()
    }

    pub fn current(&self) -> Option<f64> {
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }
}

//! Bounded, append-only bar history for one instrument.
//!
//! Eviction is FIFO once capacity is reached. Every appended bar gets a
//! sequence index that keeps counting across evictions, so swing points and
//! crossover events can refer to bars after the buffer has slid.

use std::collections::VecDeque;

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;

#[derive(Debug, Clone)]
pub struct BarSeries {
    instrument: String,
    bars: VecDeque<Bar>,
    capacity: usize,
    appended: usize,
}

impl BarSeries {
    pub fn new(instrument: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            instrument: instrument.into(),
            bars: VecDeque::with_capacity(capacity),
            capacity,
            appended: 0,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Total bars ever appended, evicted ones included.
    pub fn appended(&self) -> usize {
        self.appended
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    /// Sequence index of the most recent bar.
    pub fn last_index(&self) -> Option<usize> {
        self.appended.checked_sub(1)
    }

    /// Appends a bar. A timestamp at or before the last stored one is
    /// rejected and the series is left untouched.
    pub fn append(&mut self, bar: Bar) -> Result<usize, EngineError> {
        if let Some(last) = self.bars.back() {
            if bar.timestamp <= last.timestamp {
                return Err(EngineError::OutOfOrderBar {
                    instrument: self.instrument.clone(),
                    timestamp: bar.timestamp,
                    last: last.timestamp,
                });
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
        self.appended += 1;
        Ok(self.appended - 1)
    }

    /// The last `n` bars, oldest first, or fewer when history is short.
    pub fn window(&self, n: usize) -> impl ExactSizeIterator<Item = &Bar> + DoubleEndedIterator {
        let start = self.bars.len().saturating_sub(n);
        self.bars.range(start..)
    }

    /// Sequence index of the first bar returned by `window(n)`.
    pub fn window_start(&self, n: usize) -> usize {
        self.appended - n.min(self.bars.len())
    }
}

//! Fast/slow moving-average crossover detection.

use std::cmp::Ordering;
use std::fmt;

use crate::domain::indicator::MaSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossoverDirection {
    /// Fast moved from below to above slow.
    Bullish,
    /// Fast moved from above to below slow.
    Bearish,
}

impl fmt::Display for CrossoverDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossoverDirection::Bullish => write!(f, "bullish"),
            CrossoverDirection::Bearish => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossoverPair {
    pub fast: MaSpec,
    pub slow: MaSpec,
}

/// Emitted once, on the bar where the pair's relative order flips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverEvent {
    pub fast: MaSpec,
    pub slow: MaSpec,
    pub direction: CrossoverDirection,
    pub bar_index: usize,
}

/// Remembers the last strict ordering of a pair. Equal values keep the
/// previous ordering, so a touch without a cross emits nothing.
///
/// By default the first strict ordering is only a baseline. A tracker built
/// with [`CrossoverTracker::crossing_on_ready`] instead treats the warm-up as
/// "no ordering" and reports that first ordering as a crossover.
#[derive(Debug, Clone, Default)]
pub struct CrossoverTracker {
    last: Option<Ordering>,
    cross_on_ready: bool,
}

impl CrossoverTracker {
    pub fn crossing_on_ready() -> Self {
        Self {
            last: None,
            cross_on_ready: true,
        }
    }

    pub fn observe(&mut self, fast: f64, slow: f64) -> Option<CrossoverDirection> {
        let current = match fast.partial_cmp(&slow) {
            Some(Ordering::Equal) | None => return None,
            Some(ord) => ord,
        };
        let direction = if current == Ordering::Greater {
            CrossoverDirection::Bullish
        } else {
            CrossoverDirection::Bearish
        };
        let flipped = match self.last {
            Some(prev) if prev != current => Some(direction),
            None if self.cross_on_ready => Some(direction),
            _ => None,
        };
        self.last = Some(current);
        flipped
    }

    /// Current strict ordering of fast against slow, if any has been seen.
    pub fn ordering(&self) -> Option<Ordering> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_sets_baseline() {
        let mut t = CrossoverTracker::default();
        assert_eq!(t.observe(2.0, 1.0), None);
        assert_eq!(t.ordering(), Some(Ordering::Greater));
    }

    #[test]
    fn crossing_on_ready_reports_first_ordering() {
        let mut t = CrossoverTracker::crossing_on_ready();
        assert_eq!(t.observe(2.0, 2.0), None);
        assert_eq!(t.observe(2.0, 1.0), Some(CrossoverDirection::Bullish));
        assert_eq!(t.observe(3.0, 1.0), None);
        assert_eq!(t.observe(0.5, 1.0), Some(CrossoverDirection::Bearish));
    }

    #[test]
    fn bullish_flip() {
        let mut t = CrossoverTracker::default();
        t.observe(1.0, 2.0);
        assert_eq!(t.observe(3.0, 2.0), Some(CrossoverDirection::Bullish));
        assert_eq!(t.observe(4.0, 2.0), None);
    }

    #[test]
    fn bearish_flip() {
        let mut t = CrossoverTracker::default();
        t.observe(3.0, 2.0);
        assert_eq!(t.observe(1.0, 2.0), Some(CrossoverDirection::Bearish));
    }

    #[test]
    fn touch_then_cross_fires_once() {
        let mut t = CrossoverTracker::default();
        t.observe(1.0, 2.0);
        assert_eq!(t.observe(2.0, 2.0), None);
        assert_eq!(t.observe(3.0, 2.0), Some(CrossoverDirection::Bullish));
    }

    #[test]
    fn touch_and_return_is_silent() {
        let mut t = CrossoverTracker::default();
        t.observe(1.0, 2.0);
        t.observe(2.0, 2.0);
        assert_eq!(t.observe(1.5, 2.0), None);
    }

    #[test]
    fn nan_is_ignored() {
        let mut t = CrossoverTracker::default();
        t.observe(1.0, 2.0);
        assert_eq!(t.observe(f64::NAN, 2.0), None);
        assert_eq!(t.ordering(), Some(Ordering::Less));
    }

    #[test]
    fn direction_display() {
        assert_eq!(CrossoverDirection::Bullish.to_string(), "bullish");
        assert_eq!(CrossoverDirection::Bearish.to_string(), "bearish");
    }
}

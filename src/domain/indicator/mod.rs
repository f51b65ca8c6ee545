//! Streaming moving averages and crossover state.
//!
//! - `MaSpec`: indicator identity (period + kind), usable as a map key
//! - `MovingAverage`: one incremental tracker with current/previous value
//! - `IndicatorEngine`: the trackers of one instrument plus crossover pairs

pub mod crossover;
pub mod ema;
pub mod sma;

use std::cmp::Ordering;
use std::fmt;

use crate::domain::bar::Bar;
use crossover::{CrossoverEvent, CrossoverPair, CrossoverTracker};
use ema::ExponentialSmoother;
use sma::RunningMean;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaKind {
    Simple,
    Exponential,
}

impl MaKind {
    pub fn parse(s: &str) -> Option<MaKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sma" | "simple" => Some(MaKind::Simple),
            "ema" | "exponential" => Some(MaKind::Exponential),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaSpec {
    pub period: usize,
    pub kind: MaKind,
}

impl MaSpec {
    pub fn sma(period: usize) -> Self {
        MaSpec {
            period,
            kind: MaKind::Simple,
        }
    }

    pub fn ema(period: usize) -> Self {
        MaSpec {
            period,
            kind: MaKind::Exponential,
        }
    }
}

impl fmt::Display for MaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MaKind::Simple => write!(f, "SMA({})", self.period),
            MaKind::Exponential => write!(f, "EMA({})", self.period),
        }
    }
}

#[derive(Debug, Clone)]
enum Smoother {
    Simple(RunningMean),
    Exponential(ExponentialSmoother),
}

#[derive(Debug, Clone)]
pub struct MovingAverage {
    spec: MaSpec,
    smoother: Smoother,
    current: Option<f64>,
    previous: Option<f64>,
    samples: usize,
}

impl MovingAverage {
    pub fn new(spec: MaSpec) -> Self {
        let smoother = match spec.kind {
            MaKind::Simple => Smoother::Simple(RunningMean::new(spec.period)),
            MaKind::Exponential => Smoother::Exponential(ExponentialSmoother::new(spec.period)),
        };
        Self {
            spec,
            smoother,
            current: None,
            previous: None,
            samples: 0,
        }
    }

    pub fn update(&mut self, close: f64) -> Option<f64> {
        self.previous = self.current;
        self.current = match &mut self.smoother {
            Smoother::Simple(s) => s.push(close),
            Smoother::Exponential(e) => e.push(close),
        };
        self.samples += 1;
        self.current
    }

    pub fn spec(&self) -> MaSpec {
        self.spec
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    pub fn previous(&self) -> Option<f64> {
        self.previous
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// At least `period` bars of history have been seen.
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }
}

#[derive(Debug, Clone)]
struct PairState {
    pair: CrossoverPair,
    fast: usize,
    slow: usize,
    tracker: CrossoverTracker,
}

/// Moving-average trackers for one instrument. Trackers are shared between
/// pairs that name the same `MaSpec`.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    trackers: Vec<MovingAverage>,
    pairs: Vec<PairState>,
}

impl IndicatorEngine {
    pub fn new(pairs: &[CrossoverPair]) -> Self {
        fn slot(spec: MaSpec, trackers: &mut Vec<MovingAverage>) -> usize {
            match trackers.iter().position(|t| t.spec() == spec) {
                Some(i) => i,
                None => {
                    trackers.push(MovingAverage::new(spec));
                    trackers.len() - 1
                }
            }
        }

        let mut trackers: Vec<MovingAverage> = Vec::new();
        let pairs = pairs
            .iter()
            .map(|pair| PairState {
                pair: *pair,
                fast: slot(pair.fast, &mut trackers),
                slow: slot(pair.slow, &mut trackers),
                tracker: CrossoverTracker::default(),
            })
            .collect();
        Self { trackers, pairs }
    }

    /// Reports the first ordering after warm-up as a crossover instead of
    /// keeping it as a silent baseline.
    pub fn cross_on_ready(mut self, enabled: bool) -> Self {
        for state in &mut self.pairs {
            state.tracker = if enabled {
                CrossoverTracker::crossing_on_ready()
            } else {
                CrossoverTracker::default()
            };
        }
        self
    }

    /// Feeds one bar to every tracker and returns the crossovers it caused.
    /// Pairs whose trackers are still warming up stay silent.
    pub fn update(&mut self, bar_index: usize, bar: &Bar) -> Vec<CrossoverEvent> {
        for t in &mut self.trackers {
            t.update(bar.close);
        }

        let mut events = Vec::new();
        for state in &mut self.pairs {
            let (Some(fast), Some(slow)) = (
                self.trackers[state.fast].current(),
                self.trackers[state.slow].current(),
            ) else {
                continue;
            };
            if let Some(direction) = state.tracker.observe(fast, slow) {
                events.push(CrossoverEvent {
                    fast: state.pair.fast,
                    slow: state.pair.slow,
                    direction,
                    bar_index,
                });
            }
        }
        events
    }

    pub fn moving_average(&self, spec: MaSpec) -> Option<&MovingAverage> {
        self.trackers.iter().find(|t| t.spec() == spec)
    }

    pub fn value(&self, spec: MaSpec) -> Option<f64> {
        self.moving_average(spec).and_then(MovingAverage::current)
    }

    /// Strict ordering of fast against slow for a configured pair.
    pub fn trend(&self, pair: &CrossoverPair) -> Option<Ordering> {
        self.pairs
            .iter()
            .find(|s| s.pair == *pair)
            .and_then(|s| s.tracker.ordering())
    }

    pub fn pairs(&self) -> impl Iterator<Item = &CrossoverPair> {
        self.pairs.iter().map(|s| &s.pair)
    }

    /// Every tracker has at least `period` bars of history.
    pub fn is_ready(&self) -> bool {
        self.trackers.iter().all(MovingAverage::is_ready)
    }
}

#[cfg(test)]
mod tests {
    use super::crossover::CrossoverDirection;
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 100,
                spread: None,
            })
            .collect()
    }

    fn pair(fast: usize, slow: usize) -> CrossoverPair {
        CrossoverPair {
            fast: MaSpec::sma(fast),
            slow: MaSpec::sma(slow),
        }
    }

    #[test]
    fn ma_spec_display() {
        assert_eq!(MaSpec::sma(20).to_string(), "SMA(20)");
        assert_eq!(MaSpec::ema(9).to_string(), "EMA(9)");
    }

    #[test]
    fn ma_kind_parse() {
        assert_eq!(MaKind::parse("SMA"), Some(MaKind::Simple));
        assert_eq!(MaKind::parse(" exponential "), Some(MaKind::Exponential));
        assert_eq!(MaKind::parse("wma"), None);
    }

    #[test]
    fn moving_average_tracks_previous() {
        let mut ma = MovingAverage::new(MaSpec::sma(2));
        ma.update(1.0);
        ma.update(3.0);
        ma.update(5.0);
        assert_eq!(ma.current(), Some(4.0));
        assert_eq!(ma.previous(), Some(2.0));
        assert_eq!(ma.samples(), 3);
    }

    #[test]
    fn shared_trackers_are_deduplicated() {
        let engine = IndicatorEngine::new(&[pair(5, 20), pair(5, 50)]);
        assert_eq!(engine.trackers.len(), 3);
        assert_eq!(engine.pairs().count(), 2);
    }

    #[test]
    fn no_crossover_during_warmup() {
        let mut engine = IndicatorEngine::new(&[pair(2, 4)]);
        let closes = [5.0, 4.0, 3.0, 6.0];
        for (i, bar) in bars(&closes).iter().enumerate() {
            assert!(engine.update(i, bar).is_empty());
        }
    }

    #[test]
    fn bullish_crossover_after_decline() {
        let mut engine = IndicatorEngine::new(&[pair(2, 4)]);
        // SMA2/SMA4 at i=3: 2.5 vs 3.5 (below); i=4: 2.5 vs 3.0; i=5: 5.0 vs 3.75
        let closes = [5.0, 4.0, 3.0, 2.0, 3.0, 7.0];
        let mut events = Vec::new();
        for (i, bar) in bars(&closes).iter().enumerate() {
            events.extend(engine.update(i, bar));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossoverDirection::Bullish);
        assert_eq!(events[0].bar_index, 5);
        assert_eq!(engine.trend(&pair(2, 4)), Some(Ordering::Greater));
    }

    #[test]
    fn bearish_crossover_after_rise() {
        let mut engine = IndicatorEngine::new(&[pair(2, 4)]);
        let closes = [1.0, 2.0, 3.0, 4.0, 3.0, 0.5];
        let mut events = Vec::new();
        for (i, bar) in bars(&closes).iter().enumerate() {
            events.extend(engine.update(i, bar));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossoverDirection::Bearish);
        assert_eq!(events[0].bar_index, 5);
    }

    #[test]
    fn cross_on_ready_fires_on_first_ready_bar() {
        let rising: Vec<f64> = (0..6).map(|i| 1.0 + i as f64).collect();
        let mut engine = IndicatorEngine::new(&[pair(2, 4)]).cross_on_ready(true);
        let mut events = Vec::new();
        for (i, bar) in bars(&rising).iter().enumerate() {
            events.extend(engine.update(i, bar));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].direction, CrossoverDirection::Bullish);
        assert_eq!(events[0].bar_index, 3);

        let mut silent = IndicatorEngine::new(&[pair(2, 4)]);
        for (i, bar) in bars(&rising).iter().enumerate() {
            assert!(silent.update(i, bar).is_empty());
        }
    }

    #[test]
    fn readiness_follows_slowest_tracker() {
        let mut engine = IndicatorEngine::new(&[pair(2, 3)]);
        let b = bars(&[1.0, 2.0, 3.0]);
        engine.update(0, &b[0]);
        engine.update(1, &b[1]);
        assert!(!engine.is_ready());
        assert_eq!(engine.value(MaSpec::sma(2)), Some(1.5));
        engine.update(2, &b[2]);
        assert!(engine.is_ready());
        assert_eq!(engine.value(MaSpec::sma(3)), Some(2.0));
    }
}

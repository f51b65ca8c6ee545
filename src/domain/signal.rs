//! Merges moving-average and pattern detections into one directional signal.
//!
//! Conflict policy: sources that disagree yield `Flat`, never a blended
//! partial position. Hysteresis: no pyramiding, and an opposing signal
//! closes the open position first; re-entry is reassessed on the next cycle.

use std::cmp::Ordering;
use std::fmt;

use crate::domain::indicator::crossover::{CrossoverDirection, CrossoverEvent};
use crate::domain::pattern::PatternMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

impl From<CrossoverDirection> for Side {
    fn from(d: CrossoverDirection) -> Self {
        match d {
            CrossoverDirection::Bullish => Side::Long,
            CrossoverDirection::Bearish => Side::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Long,
    Short,
    Flat,
}

impl Direction {
    pub fn side(self) -> Option<Side> {
        match self {
            Direction::Long => Some(Side::Long),
            Direction::Short => Some(Side::Short),
            Direction::Flat => None,
        }
    }
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

/// Closed set of signal-producing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalSource {
    MovingAverage,
    Pattern,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub instrument: String,
    pub direction: Direction,
    /// In [0, 1].
    pub strength: f64,
    /// Sub-detectors that voted for `direction`.
    pub sources: Vec<SignalSource>,
}

impl Signal {
    pub fn flat(instrument: &str) -> Self {
        Signal {
            instrument: instrument.to_string(),
            direction: Direction::Flat,
            strength: 0.0,
            sources: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.direction == Direction::Flat
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    /// Strength contributed by a crossover.
    pub crossover_strength: f64,
    /// Entries need at least this strength.
    pub min_entry_strength: f64,
    pub pullback_entries: bool,
    pub pullback_strength: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            crossover_strength: 0.5,
            min_entry_strength: 0.25,
            pullback_entries: false,
            pullback_strength: 0.3,
        }
    }
}

/// What the moving-average strategy says this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaVote {
    Silent,
    Bias { side: Side, strength: f64 },
    Conflict,
}

/// Trend pullback: in an uptrend the previous close dipped under the fast
/// average and the current close turned up (mirrored for downtrends).
pub fn pullback_bias(trend: Option<Ordering>, fast: f64, prev_close: f64, close: f64) -> Option<Side> {
    match trend? {
        Ordering::Greater if prev_close < fast && close > prev_close => Some(Side::Long),
        Ordering::Less if prev_close > fast && close < prev_close => Some(Side::Short),
        _ => None,
    }
}

/// Decision for one instrument after reconciling a signal with its position.
#[derive(Debug, Clone, PartialEq)]
pub enum Bias {
    Hold,
    Enter(Signal),
    /// Close the open position; no same-cycle reversal.
    ExitOpposite(Signal),
}

#[derive(Debug, Clone)]
pub struct SignalAggregator {
    config: SignalConfig,
    previous: Option<Signal>,
    reassess: bool,
}

impl SignalAggregator {
    pub fn new(config: SignalConfig) -> Self {
        Self {
            config,
            previous: None,
            reassess: false,
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn previous(&self) -> Option<&Signal> {
        self.previous.as_ref()
    }

    /// Collapses this cycle's crossovers (plus an optional pullback) into
    /// one moving-average vote. Crossovers pointing both ways conflict.
    pub fn ma_vote(&self, crossovers: &[CrossoverEvent], pullback: Option<Side>) -> MaVote {
        let mut sides = crossovers.iter().map(|c| Side::from(c.direction));
        if let Some(first) = sides.next() {
            if sides.any(|s| s != first) {
                return MaVote::Conflict;
            }
            return MaVote::Bias {
                side: first,
                strength: self.config.crossover_strength,
            };
        }
        match pullback {
            Some(side) if self.config.pullback_entries => MaVote::Bias {
                side,
                strength: self.config.pullback_strength,
            },
            _ => MaVote::Silent,
        }
    }

    /// Pure combination of the two sources into a signal.
    pub fn combine(&self, instrument: &str, ma: MaVote, pattern: Option<&PatternMatch>) -> Signal {
        let pattern = pattern.map(|m| (m.kind.breakout_side(), m.confidence.clamp(0.0, 1.0)));
        let (direction, strength, sources) = match (ma, pattern) {
            (MaVote::Conflict, _) => return Signal::flat(instrument),
            (MaVote::Bias { side: a, strength: sa }, Some((b, sb))) => {
                if a != b {
                    return Signal::flat(instrument);
                }
                (
                    a,
                    (sa + sb).min(1.0),
                    vec![SignalSource::MovingAverage, SignalSource::Pattern],
                )
            }
            (MaVote::Bias { side, strength }, None) => {
                (side, strength, vec![SignalSource::MovingAverage])
            }
            (MaVote::Silent, Some((side, strength))) => (side, strength, vec![SignalSource::Pattern]),
            (MaVote::Silent, None) => return Signal::flat(instrument),
        };
        Signal {
            instrument: instrument.to_string(),
            direction: direction.into(),
            strength: strength.clamp(0.0, 1.0),
            sources,
        }
    }

    /// Applies hysteresis against the side of the active position, if any.
    /// `closing` means an exit is already in flight for it.
    pub fn reconcile(&mut self, signal: Signal, open: Option<Side>, closing: bool) -> Bias {
        let reassess = std::mem::take(&mut self.reassess);
        let previous = self.previous.replace(signal.clone());

        match open {
            Some(side) => {
                if closing {
                    return Bias::Hold;
                }
                match signal.direction.side() {
                    Some(s) if s == side.opposite() => {
                        self.reassess = true;
                        Bias::ExitOpposite(signal)
                    }
                    _ => Bias::Hold,
                }
            }
            None => {
                let candidate = if !signal.is_flat() {
                    Some(signal)
                } else if reassess {
                    previous
                } else {
                    None
                };
                match candidate {
                    Some(s) if !s.is_flat() && s.strength >= self.config.min_entry_strength => {
                        Bias::Enter(s)
                    }
                    _ => Bias::Hold,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::MaSpec;
    use crate::domain::pattern::{Neckline, PatternKind, SwingKind, SwingPoint};

    fn crossover(direction: CrossoverDirection) -> CrossoverEvent {
        CrossoverEvent {
            fast: MaSpec::sma(20),
            slow: MaSpec::sma(50),
            direction,
            bar_index: 60,
        }
    }

    fn point(index: usize, price: f64, kind: SwingKind) -> SwingPoint {
        SwingPoint { index, price, kind }
    }

    fn pattern(kind: PatternKind, confidence: f64) -> PatternMatch {
        PatternMatch {
            kind,
            left_shoulder: point(10, 1.11, SwingKind::High),
            head: point(20, 1.12, SwingKind::High),
            right_shoulder: point(30, 1.11, SwingKind::High),
            neckline: Neckline {
                left: point(15, 1.10, SwingKind::Low),
                right: point(25, 1.10, SwingKind::Low),
            },
            neckline_price: 1.10,
            confidence,
        }
    }

    fn aggregator() -> SignalAggregator {
        SignalAggregator::new(SignalConfig::default())
    }

    #[test]
    fn crossover_alone_gives_its_direction() {
        let agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bullish)], None);
        let s = agg.combine("EURUSD", vote, None);
        assert_eq!(s.direction, Direction::Long);
        assert_eq!(s.strength, 0.5);
        assert_eq!(s.sources, vec![SignalSource::MovingAverage]);
    }

    #[test]
    fn pattern_alone_uses_confidence() {
        let agg = aggregator();
        let m = pattern(PatternKind::HeadAndShoulders, 0.8);
        let s = agg.combine("EURUSD", MaVote::Silent, Some(&m));
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.strength, 0.8);
        assert_eq!(s.sources, vec![SignalSource::Pattern]);
    }

    #[test]
    fn agreement_boosts_and_caps() {
        let agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bearish)], None);
        let m = pattern(PatternKind::HeadAndShoulders, 0.9);
        let s = agg.combine("EURUSD", vote, Some(&m));
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.strength, 1.0);
        assert_eq!(s.sources.len(), 2);
    }

    #[test]
    fn disagreement_is_flat() {
        let agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bullish)], None);
        let m = pattern(PatternKind::HeadAndShoulders, 0.9);
        assert!(agg.combine("EURUSD", vote, Some(&m)).is_flat());
    }

    #[test]
    fn conflicting_crossovers_are_flat() {
        let agg = aggregator();
        let vote = agg.ma_vote(
            &[
                crossover(CrossoverDirection::Bullish),
                crossover(CrossoverDirection::Bearish),
            ],
            None,
        );
        assert_eq!(vote, MaVote::Conflict);
        let m = pattern(PatternKind::InverseHeadAndShoulders, 0.9);
        assert!(agg.combine("EURUSD", vote, Some(&m)).is_flat());
    }

    #[test]
    fn pullback_ignored_unless_enabled() {
        let agg = aggregator();
        assert_eq!(agg.ma_vote(&[], Some(Side::Long)), MaVote::Silent);

        let enabled = SignalAggregator::new(SignalConfig {
            pullback_entries: true,
            ..SignalConfig::default()
        });
        assert_eq!(
            enabled.ma_vote(&[], Some(Side::Long)),
            MaVote::Bias {
                side: Side::Long,
                strength: 0.3
            }
        );
    }

    #[test]
    fn pullback_detection() {
        assert_eq!(
            pullback_bias(Some(Ordering::Greater), 1.10, 1.09, 1.095),
            Some(Side::Long)
        );
        assert_eq!(
            pullback_bias(Some(Ordering::Less), 1.10, 1.11, 1.105),
            Some(Side::Short)
        );
        assert_eq!(pullback_bias(Some(Ordering::Greater), 1.10, 1.11, 1.12), None);
        assert_eq!(pullback_bias(None, 1.10, 1.09, 1.095), None);
    }

    #[test]
    fn enter_when_flat_and_strong_enough() {
        let mut agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bullish)], None);
        let s = agg.combine("EURUSD", vote, None);
        assert!(matches!(agg.reconcile(s, None, false), Bias::Enter(_)));
    }

    #[test]
    fn weak_signal_does_not_enter() {
        let mut agg = aggregator();
        let m = pattern(PatternKind::HeadAndShoulders, 0.1);
        let s = agg.combine("EURUSD", MaVote::Silent, Some(&m));
        assert_eq!(agg.reconcile(s, None, false), Bias::Hold);
    }

    #[test]
    fn same_direction_is_ignored() {
        let mut agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bullish)], None);
        let s = agg.combine("EURUSD", vote, None);
        assert_eq!(agg.reconcile(s, Some(Side::Long), false), Bias::Hold);
    }

    #[test]
    fn opposite_exits_then_reassesses_next_cycle() {
        let mut agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bearish)], None);
        let s = agg.combine("EURUSD", vote, None);
        assert!(matches!(
            agg.reconcile(s, Some(Side::Long), false),
            Bias::ExitOpposite(_)
        ));

        // next cycle: position closed, nothing new fired
        match agg.reconcile(Signal::flat("EURUSD"), None, false) {
            Bias::Enter(sig) => assert_eq!(sig.direction, Direction::Short),
            other => panic!("expected re-entry, got {other:?}"),
        }

        // the one after: no lingering re-entry
        assert_eq!(agg.reconcile(Signal::flat("EURUSD"), None, false), Bias::Hold);
    }

    #[test]
    fn closing_position_holds() {
        let mut agg = aggregator();
        let vote = agg.ma_vote(&[crossover(CrossoverDirection::Bearish)], None);
        let s = agg.combine("EURUSD", vote, None);
        assert_eq!(agg.reconcile(s, Some(Side::Long), true), Bias::Hold);
    }

    #[test]
    fn previous_signal_is_kept() {
        let mut agg = aggregator();
        agg.reconcile(Signal::flat("EURUSD"), None, false);
        assert!(agg.previous().unwrap().is_flat());
    }
}

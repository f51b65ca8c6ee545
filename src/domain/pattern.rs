//! Head-and-shoulders detection over a sliding bar window.
//!
//! Pattern state is re-derived from the window on every call: swing points
//! first, then consecutive (shoulder, head, shoulder) triples, then a
//! breakout check on the newest bar. A match only produces a bias on the
//! first close beyond the neckline after the right shoulder.
//!
//! All indices are bar sequence indices (see `BarSeries::window_start`), so
//! a match stays comparable across cycles while its points remain in view.

use std::fmt;

use crate::domain::bar::Bar;
use crate::domain::signal::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
    pub kind: SwingKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    HeadAndShoulders,
    InverseHeadAndShoulders,
}

impl PatternKind {
    /// Direction of the confirmed breakout.
    pub fn breakout_side(&self) -> Side {
        match self {
            PatternKind::HeadAndShoulders => Side::Short,
            PatternKind::InverseHeadAndShoulders => Side::Long,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::HeadAndShoulders => write!(f, "head_and_shoulders"),
            PatternKind::InverseHeadAndShoulders => write!(f, "inverse_head_and_shoulders"),
        }
    }
}

/// Line through the two troughs (or peaks) either side of the head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neckline {
    pub left: SwingPoint,
    pub right: SwingPoint,
}

impl Neckline {
    pub fn slope(&self) -> f64 {
        let span = self.right.index as f64 - self.left.index as f64;
        if span == 0.0 {
            0.0
        } else {
            (self.right.price - self.left.price) / span
        }
    }

    pub fn price_at(&self, index: usize) -> f64 {
        self.left.price + self.slope() * (index as f64 - self.left.index as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub left_shoulder: SwingPoint,
    pub head: SwingPoint,
    pub right_shoulder: SwingPoint,
    pub neckline: Neckline,
    /// Neckline projected onto the newest bar of the scanned window.
    pub neckline_price: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternConfig {
    /// Bars scanned per cycle.
    pub window: usize,
    /// A swing high must exceed every bar within this many bars on each side.
    pub swing_radius: usize,
    /// Max shoulder mismatch as a fraction of pattern height.
    pub shoulder_tolerance: f64,
    /// Max neckline rise/fall as a fraction of pattern height.
    pub neckline_tolerance: f64,
    pub min_confidence: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            window: 100,
            swing_radius: 2,
            shoulder_tolerance: 0.4,
            neckline_tolerance: 0.3,
            min_confidence: 0.5,
        }
    }
}

const SYMMETRY_WEIGHT: f64 = 0.4;
const NECKLINE_WEIGHT: f64 = 0.4;
const VOLUME_WEIGHT: f64 = 0.2;

/// Combines shoulder symmetry, neckline flatness and volume profile into
/// [0, 1]. Ratios are measured against pattern height; a ratio at the
/// tolerance scores zero for that component. Without volume the first two
/// components share the weight equally.
pub fn confidence_score(
    shoulder_ratio: f64,
    neckline_ratio: f64,
    volume_score: Option<f64>,
    config: &PatternConfig,
) -> f64 {
    let symmetry = (1.0 - shoulder_ratio / config.shoulder_tolerance).clamp(0.0, 1.0);
    let flatness = (1.0 - neckline_ratio / config.neckline_tolerance).clamp(0.0, 1.0);
    let score = match volume_score {
        Some(v) => {
            SYMMETRY_WEIGHT * symmetry + NECKLINE_WEIGHT * flatness + VOLUME_WEIGHT * v.clamp(0.0, 1.0)
        }
        None => 0.5 * symmetry + 0.5 * flatness,
    };
    score.clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Local extrema of `bars`, ordered by index. `base_index` is the
    /// sequence index of `bars[0]`.
    pub fn swing_points(&self, base_index: usize, bars: &[Bar]) -> Vec<SwingPoint> {
        let r = self.config.swing_radius.max(1);
        let mut points = Vec::new();
        if bars.len() < 2 * r + 1 {
            return points;
        }
        for i in r..bars.len() - r {
            let mut neighbours = (i - r..=i + r).filter(|&j| j != i);
            if neighbours.clone().all(|j| bars[i].high > bars[j].high) {
                points.push(SwingPoint {
                    index: base_index + i,
                    price: bars[i].high,
                    kind: SwingKind::High,
                });
            }
            if neighbours.all(|j| bars[i].low < bars[j].low) {
                points.push(SwingPoint {
                    index: base_index + i,
                    price: bars[i].low,
                    kind: SwingKind::Low,
                });
            }
        }
        points
    }

    /// Every formation in the window scoring at least `min_confidence`,
    /// confirmed or not, left to right.
    pub fn scan(&self, base_index: usize, bars: &[Bar]) -> Vec<PatternMatch> {
        let swings = self.swing_points(base_index, bars);
        let mut matches = Vec::new();
        for kind in [
            PatternKind::HeadAndShoulders,
            PatternKind::InverseHeadAndShoulders,
        ] {
            let wanted = match kind {
                PatternKind::HeadAndShoulders => SwingKind::High,
                PatternKind::InverseHeadAndShoulders => SwingKind::Low,
            };
            let extremes: Vec<SwingPoint> =
                swings.iter().copied().filter(|s| s.kind == wanted).collect();
            for triple in extremes.windows(3) {
                if let Some(m) = self.evaluate(kind, triple, base_index, bars) {
                    matches.push(m);
                }
            }
        }
        matches.sort_by_key(|m| m.left_shoulder.index);
        matches
    }

    /// The formation whose neckline the newest bar has just closed through,
    /// if any. Ties on confidence go to the most recent formation.
    pub fn confirmed(&self, base_index: usize, bars: &[Bar]) -> Option<PatternMatch> {
        self.scan(base_index, bars)
            .into_iter()
            .filter(|m| self.is_breakout(m, base_index, bars))
            .fold(None, |best: Option<PatternMatch>, m| match best {
                Some(b) if b.confidence > m.confidence => Some(b),
                _ => Some(m),
            })
    }

    fn evaluate(
        &self,
        kind: PatternKind,
        triple: &[SwingPoint],
        base_index: usize,
        bars: &[Bar],
    ) -> Option<PatternMatch> {
        let (ls, head, rs) = (triple[0], triple[1], triple[2]);
        let local = |p: &SwingPoint| p.index - base_index;

        let (left_neck, right_neck) = match kind {
            PatternKind::HeadAndShoulders => {
                if head.price <= ls.price || head.price <= rs.price {
                    return None;
                }
                (
                    extreme_between(bars, local(&ls), local(&head), base_index, SwingKind::Low)?,
                    extreme_between(bars, local(&head), local(&rs), base_index, SwingKind::Low)?,
                )
            }
            PatternKind::InverseHeadAndShoulders => {
                if head.price >= ls.price || head.price >= rs.price {
                    return None;
                }
                (
                    extreme_between(bars, local(&ls), local(&head), base_index, SwingKind::High)?,
                    extreme_between(bars, local(&head), local(&rs), base_index, SwingKind::High)?,
                )
            }
        };

        let neck_mid = (left_neck.price + right_neck.price) / 2.0;
        let height = (head.price - neck_mid).abs();
        if height <= 0.0 {
            return None;
        }
        // Neckline must sit on the far side of both shoulders.
        let neck_clear = match kind {
            PatternKind::HeadAndShoulders => {
                left_neck.price.max(right_neck.price) < ls.price.min(rs.price)
            }
            PatternKind::InverseHeadAndShoulders => {
                left_neck.price.min(right_neck.price) > ls.price.max(rs.price)
            }
        };
        if !neck_clear {
            return None;
        }

        let shoulder_ratio = (ls.price - rs.price).abs() / height;
        let neckline_ratio = (right_neck.price - left_neck.price).abs() / height;
        if shoulder_ratio > self.config.shoulder_tolerance
            || neckline_ratio > self.config.neckline_tolerance
        {
            return None;
        }

        let volume = volume_profile(
            &bars[local(&ls)],
            &bars[local(&head)],
            &bars[local(&rs)],
        );
        let confidence = confidence_score(shoulder_ratio, neckline_ratio, volume, &self.config);
        if confidence < self.config.min_confidence {
            tracing::trace!(%kind, confidence, "formation below confidence threshold");
            return None;
        }

        let neckline = Neckline {
            left: left_neck,
            right: right_neck,
        };
        let last_index = base_index + bars.len() - 1;
        Some(PatternMatch {
            kind,
            left_shoulder: ls,
            head,
            right_shoulder: rs,
            neckline,
            neckline_price: neckline.price_at(last_index),
            confidence,
        })
    }

    /// The newest bar is the first close beyond the neckline since the
    /// right shoulder became a swing point, `swing_radius` bars after it.
    /// Closes past the neckline before that cannot have confirmed anything,
    /// so they do not count as an earlier break.
    fn is_breakout(&self, m: &PatternMatch, base_index: usize, bars: &[Bar]) -> bool {
        let beyond = |local: usize| {
            let neck = m.neckline.price_at(base_index + local);
            match m.kind {
                PatternKind::HeadAndShoulders => bars[local].close < neck,
                PatternKind::InverseHeadAndShoulders => bars[local].close > neck,
            }
        };
        let last = bars.len() - 1;
        let formed = m.right_shoulder.index - base_index + self.config.swing_radius.max(1);
        formed <= last && beyond(last) && !(formed..last).any(beyond)
    }
}

/// Lowest low (or highest high) strictly between two local indices.
fn extreme_between(
    bars: &[Bar],
    from: usize,
    to: usize,
    base_index: usize,
    kind: SwingKind,
) -> Option<SwingPoint> {
    let inner = from + 1..to;
    let pick = match kind {
        SwingKind::Low => inner
            .map(|i| (i, bars[i].low))
            .min_by(|a, b| a.1.total_cmp(&b.1)),
        SwingKind::High => inner
            .map(|i| (i, bars[i].high))
            .max_by(|a, b| a.1.total_cmp(&b.1)),
    }?;
    Some(SwingPoint {
        index: base_index + pick.0,
        price: pick.1,
        kind,
    })
}

/// Classic profile: volume fades from left shoulder to head to right
/// shoulder. None when the feed carries no volume.
fn volume_profile(ls: &Bar, head: &Bar, rs: &Bar) -> Option<f64> {
    if !(ls.has_volume() && head.has_volume() && rs.has_volume()) {
        return None;
    }
    let mut score = 0.0;
    if ls.volume >= head.volume {
        score += 0.5;
    }
    if head.volume >= rs.volume {
        score += 0.5;
    }
    Some(score)
}

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
pub use futurebreakout::domain::bar::Bar;
use futurebreakout::domain::engine::EngineConfig;
use futurebreakout::domain::indicator::MaSpec;
use futurebreakout::domain::indicator::crossover::CrossoverPair;
use futurebreakout::domain::intent::{ExecutionEvent, Intent};

pub const WICK: f64 = 0.0002;

pub fn ts(minute: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
        + Duration::minutes(minute)
}

/// Bar with no range, volume or spread.
pub fn flat_bar(minute: i64, close: f64) -> Bar {
    Bar {
        timestamp: ts(minute),
        open: close,
        high: close,
        low: close,
        close,
        volume: 0,
        spread: None,
    }
}

/// Bar with a small symmetric range and constant volume.
pub fn wick_bar(minute: i64, close: f64) -> Bar {
    Bar {
        timestamp: ts(minute),
        open: close,
        high: close + WICK,
        low: close - WICK,
        close,
        volume: 100,
        spread: None,
    }
}

pub fn flat_bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| flat_bar(i as i64, c))
        .collect()
}

/// Linear path through (index, close) anchors, one close per index.
pub fn path(anchors: &[(usize, f64)]) -> Vec<f64> {
    let mut closes = Vec::new();
    for w in anchors.windows(2) {
        let ((i0, p0), (i1, p1)) = (w[0], w[1]);
        for i in i0..i1 {
            closes.push(p0 + (p1 - p0) * (i - i0) as f64 / (i1 - i0) as f64);
        }
    }
    if let Some(&(_, p)) = anchors.last() {
        closes.push(p);
    }
    closes
}

/// Peaks at 10, 20 (head) and 30, troughs at 15 and 25, first close under
/// the neckline at 36.
pub fn head_and_shoulders() -> Vec<f64> {
    path(&[
        (0, 1.1000),
        (10, 1.1100),
        (15, 1.1040),
        (20, 1.1160),
        (25, 1.1040),
        (30, 1.1100),
        (36, 1.1028),
    ])
}

/// 25 falling closes, 10 pips apart, then `rising` closes climbing 20 pips
/// per bar.
pub fn decline_then_rise(rising: usize) -> Vec<f64> {
    let mut closes: Vec<f64> = (0..25).map(|i| 1.1200 - 0.0010 * i as f64).collect();
    closes.extend((1..=rising).map(|i| 1.0960 + 0.0020 * i as f64));
    closes
}

pub fn config_with_sma(fast: usize, slow: usize) -> EngineConfig {
    EngineConfig {
        crossovers: vec![CrossoverPair {
            fast: MaSpec::sma(fast),
            slow: MaSpec::sma(slow),
        }],
        ..EngineConfig::default()
    }
}

pub fn fill(intent: &Intent, price: f64) -> ExecutionEvent {
    ExecutionEvent::EntryFilled {
        intent: intent.id,
        position: intent.position,
        price,
        timestamp: intent.created_at,
    }
}

pub fn reject(intent: &Intent, reason: &str) -> ExecutionEvent {
    ExecutionEvent::Rejected {
        intent: intent.id,
        position: intent.position,
        reason: reason.to_string(),
    }
}

/// Simple mean of the `period` values ending at `end`.
pub fn mean(values: &[f64], end: usize, period: usize) -> f64 {
    values[end + 1 - period..=end].iter().sum::<f64>() / period as f64
}

//! OHLCV price bar.

use chrono::{NaiveDate, NaiveDateTime};

/// One OHLCV sample for a fixed interval. Immutable once appended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    /// Venue spread at bar close, in price units, when the feed reports it.
    pub spread: Option<f64>,
}

impl Bar {
    pub fn trading_day(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn has_volume(&self) -> bool {
        self.volume > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(14, 30, 0)
                .unwrap(),
            open: 1.1000,
            high: 1.1050,
            low: 1.0950,
            close: 1.1020,
            volume: 500,
            spread: None,
        }
    }

    #[test]
    fn trading_day_drops_time() {
        let bar = sample_bar();
        assert_eq!(
            bar.trading_day(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
        );
    }

    #[test]
    fn volume_presence() {
        let mut bar = sample_bar();
        assert!(bar.has_volume());
        bar.volume = 0;
        assert!(!bar.has_volume());
    }
}

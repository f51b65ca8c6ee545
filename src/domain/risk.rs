//! Per-day risk accounting shared by every instrument.
//!
//! `RiskBook` wraps one `RiskState` behind a mutex; every read-modify-write
//! (day rollover, P&L marks, halt evaluation) happens under a single lock.
//! A halt is sticky until the next trading day.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskLimits {
    /// Positive amount; trading halts once the day's P&L reaches -limit.
    pub daily_loss_limit: f64,
    pub daily_profit_target: f64,
    /// Halt on reaching the profit target as well.
    pub stop_on_target: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            daily_loss_limit: 500.0,
            daily_profit_target: 300.0,
            stop_on_target: true,
        }
    }
}

impl RiskLimits {
    /// Profit target as a percentage of account balance.
    pub fn target_from_balance(balance: f64, target_pct: f64) -> f64 {
        balance * target_pct / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaltReason {
    LossLimit,
    ProfitTarget,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::LossLimit => write!(f, "daily loss limit"),
            HaltReason::ProfitTarget => write!(f, "daily profit target"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskState {
    pub trading_day: Option<NaiveDate>,
    pub realized_pnl: f64,
    /// Open P&L per instrument, as last marked.
    pub unrealized: BTreeMap<String, f64>,
    pub limits: RiskLimits,
    pub trading_halted: bool,
    pub halt_reason: Option<HaltReason>,
}

impl RiskState {
    pub fn new(limits: RiskLimits) -> Self {
        RiskState {
            trading_day: None,
            realized_pnl: 0.0,
            unrealized: BTreeMap::new(),
            limits,
            trading_halted: false,
            halt_reason: None,
        }
    }

    pub fn day_pnl(&self) -> f64 {
        self.realized_pnl + self.unrealized.values().sum::<f64>()
    }

    /// Starts a new trading day if `day` is later than the current one.
    /// Returns true when the state was reset.
    pub fn begin_day(&mut self, day: NaiveDate) -> bool {
        match self.trading_day {
            Some(current) if day <= current => false,
            _ => {
                self.trading_day = Some(day);
                self.realized_pnl = 0.0;
                self.unrealized.clear();
                self.trading_halted = false;
                self.halt_reason = None;
                true
            }
        }
    }

    pub fn mark(&mut self, instrument: &str, unrealized: f64) {
        if unrealized == 0.0 {
            self.unrealized.remove(instrument);
        } else {
            self.unrealized.insert(instrument.to_string(), unrealized);
        }
        self.evaluate();
    }

    /// Books a closed trade; the instrument's open mark is cleared.
    pub fn record_realized(&mut self, instrument: &str, pnl: f64) {
        self.realized_pnl += pnl;
        self.unrealized.remove(instrument);
        self.evaluate();
    }

    fn evaluate(&mut self) {
        if self.trading_halted {
            return;
        }
        let pnl = self.day_pnl();
        let reason = if self.limits.daily_loss_limit > 0.0 && pnl <= -self.limits.daily_loss_limit {
            Some(HaltReason::LossLimit)
        } else if self.limits.stop_on_target
            && self.limits.daily_profit_target > 0.0
            && pnl >= self.limits.daily_profit_target
        {
            Some(HaltReason::ProfitTarget)
        } else {
            None
        };
        if let Some(reason) = reason {
            tracing::warn!(%reason, pnl, "trading halted for the day");
            self.trading_halted = true;
            self.halt_reason = Some(reason);
        }
    }
}

/// Shared handle to the process-wide `RiskState`.
#[derive(Debug, Clone)]
pub struct RiskBook {
    inner: Arc<Mutex<RiskState>>,
}

impl RiskBook {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RiskState::new(limits))),
        }
    }

    // A panic elsewhere cannot leave RiskState half-written: every mutation
    // is a plain field update, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, RiskState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin_day(&self, day: NaiveDate) -> bool {
        let reset = self.lock().begin_day(day);
        if reset {
            tracing::info!(%day, "risk state reset for new trading day");
        }
        reset
    }

    /// Marks open P&L and returns whether trading is halted afterwards.
    pub fn mark(&self, instrument: &str, unrealized: f64) -> bool {
        let mut state = self.lock();
        state.mark(instrument, unrealized);
        state.trading_halted
    }

    pub fn record_realized(&self, instrument: &str, pnl: f64) -> bool {
        let mut state = self.lock();
        state.record_realized(instrument, pnl);
        state.trading_halted
    }

    pub fn is_halted(&self) -> bool {
        self.lock().trading_halted
    }

    pub fn snapshot(&self) -> RiskState {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn limits() -> RiskLimits {
        RiskLimits {
            daily_loss_limit: 100.0,
            daily_profit_target: 200.0,
            stop_on_target: true,
        }
    }

    #[test]
    fn loss_limit_halts_on_unrealized() {
        let mut state = RiskState::new(limits());
        state.begin_day(day(1));
        state.mark("EURUSD", -60.0);
        assert!(!state.trading_halted);
        state.mark("EURUSD", -100.0);
        assert!(state.trading_halted);
        assert_eq!(state.halt_reason, Some(HaltReason::LossLimit));
    }

    #[test]
    fn loss_limit_sums_instruments() {
        let mut state = RiskState::new(limits());
        state.begin_day(day(1));
        state.record_realized("GBPUSD", -50.0);
        state.mark("EURUSD", -55.0);
        assert!(state.trading_halted);
    }

    #[test]
    fn profit_target_only_when_enabled() {
        let mut state = RiskState::new(RiskLimits {
            stop_on_target: false,
            ..limits()
        });
        state.begin_day(day(1));
        state.record_realized("EURUSD", 250.0);
        assert!(!state.trading_halted);

        let mut state = RiskState::new(limits());
        state.begin_day(day(1));
        state.record_realized("EURUSD", 250.0);
        assert_eq!(state.halt_reason, Some(HaltReason::ProfitTarget));
    }

    #[test]
    fn halt_is_sticky_within_day() {
        let mut state = RiskState::new(limits());
        state.begin_day(day(1));
        state.mark("EURUSD", -150.0);
        state.mark("EURUSD", 0.0);
        assert!(state.trading_halted);
    }

    #[test]
    fn new_day_resets() {
        let mut state = RiskState::new(limits());
        assert!(state.begin_day(day(1)));
        state.record_realized("EURUSD", -150.0);
        assert!(!state.begin_day(day(1)));
        assert!(state.trading_halted);
        assert!(state.begin_day(day(2)));
        assert!(!state.trading_halted);
        assert_eq!(state.realized_pnl, 0.0);
        assert!(state.unrealized.is_empty());
    }

    #[test]
    fn older_day_does_not_reset() {
        let mut state = RiskState::new(limits());
        state.begin_day(day(2));
        state.record_realized("EURUSD", -20.0);
        assert!(!state.begin_day(day(1)));
        assert_eq!(state.realized_pnl, -20.0);
    }

    #[test]
    fn realized_clears_mark() {
        let mut state = RiskState::new(limits());
        state.begin_day(day(1));
        state.mark("EURUSD", -40.0);
        state.record_realized("EURUSD", -40.0);
        assert_eq!(state.day_pnl(), -40.0);
    }

    #[test]
    fn target_from_balance() {
        assert_eq!(RiskLimits::target_from_balance(10_000.0, 3.0), 300.0);
    }

    #[test]
    fn book_is_shared_across_clones_and_threads() {
        let book = RiskBook::new(limits());
        book.begin_day(day(1));
        std::thread::scope(|s| {
            for name in ["EURUSD", "GBPUSD", "USDJPY", "AUDUSD"] {
                let book = book.clone();
                s.spawn(move || {
                    book.record_realized(name, -10.0);
                });
            }
        });
        let snap = book.snapshot();
        assert_eq!(snap.realized_pnl, -40.0);
        assert!(!book.is_halted());
        assert!(book.mark("EURUSD", -60.0));
    }
}

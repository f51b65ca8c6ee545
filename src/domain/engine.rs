//! Per-instrument decision cycle.
//!
//! `StrategyEngine::on_bar` appends the bar, updates the moving averages,
//! re-derives the confirmed pattern from the current window, folds both into
//! a signal, and lets the position manager turn that signal and the shared
//! risk state into intents. Intents come out exits first, then stop
//! adjustments, then entries. The engine never talks to a venue; fills and
//! rejections come back through `on_event`.

use crate::domain::bar::Bar;
use crate::domain::bar_series::BarSeries;
use crate::domain::error::EngineError;
use crate::domain::indicator::crossover::{CrossoverEvent, CrossoverPair};
use crate::domain::indicator::{IndicatorEngine, MaSpec};
use crate::domain::intent::{ExecutionEvent, ExitReason, Intent};
use crate::domain::pattern::{PatternConfig, PatternDetector, PatternMatch};
use crate::domain::position_manager::{PositionConfig, PositionManager};
use crate::domain::risk::{RiskBook, RiskLimits};
use crate::domain::signal::{Bias, Side, Signal, SignalAggregator, SignalConfig, pullback_bias};

/// Read-only parameters for one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Bars retained per instrument.
    pub capacity: usize,
    /// The first pair also drives trend-pullback entries.
    pub crossovers: Vec<CrossoverPair>,
    /// The ordering seen on the first bar with every average ready counts
    /// as a crossover.
    pub cross_on_ready: bool,
    pub pattern: PatternConfig,
    pub signal: SignalConfig,
    pub position: PositionConfig,
    pub risk: RiskLimits,
    /// Entries are skipped on bars whose spread exceeds this.
    pub max_spread_pips: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            capacity: 500,
            crossovers: vec![CrossoverPair {
                fast: MaSpec::sma(20),
                slow: MaSpec::sma(50),
            }],
            cross_on_ready: false,
            pattern: PatternConfig::default(),
            signal: SignalConfig::default(),
            position: PositionConfig::default(),
            risk: RiskLimits::default(),
            max_spread_pips: 20.0,
        }
    }
}

/// Everything one decision cycle saw and decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub bar_index: usize,
    pub crossovers: Vec<CrossoverEvent>,
    pub pattern: Option<PatternMatch>,
    pub signal: Signal,
    pub halted: bool,
    pub intents: Vec<Intent>,
}

#[derive(Debug)]
pub struct StrategyEngine {
    config: EngineConfig,
    series: BarSeries,
    indicators: IndicatorEngine,
    detector: PatternDetector,
    aggregator: SignalAggregator,
    positions: PositionManager,
    risk: RiskBook,
}

impl StrategyEngine {
    pub fn new(instrument: impl Into<String>, config: EngineConfig, risk: RiskBook) -> Self {
        let instrument = instrument.into();
        Self {
            series: BarSeries::new(instrument.clone(), config.capacity),
            indicators: IndicatorEngine::new(&config.crossovers).cross_on_ready(config.cross_on_ready),
            detector: PatternDetector::new(config.pattern.clone()),
            aggregator: SignalAggregator::new(config.signal.clone()),
            positions: PositionManager::new(instrument, config.position.clone()),
            config,
            risk,
        }
    }

    pub fn instrument(&self) -> &str {
        self.series.instrument()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    pub fn indicators(&self) -> &IndicatorEngine {
        &self.indicators
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn risk(&self) -> &RiskBook {
        &self.risk
    }

    /// Runs one decision cycle and returns its intents.
    pub fn on_bar(&mut self, bar: Bar) -> Result<Vec<Intent>, EngineError> {
        self.step(bar).map(|cycle| cycle.intents)
    }

    /// Runs one decision cycle. An out-of-order bar is rejected before any
    /// state changes.
    pub fn step(&mut self, bar: Bar) -> Result<Cycle, EngineError> {
        let prev_close = self.series.last().map(|b| b.close);
        let bar_index = self.series.append(bar)?;
        self.risk.begin_day(bar.trading_day());

        let crossovers = self.indicators.update(bar_index, &bar);
        let width = self.config.pattern.window;
        let base = self.series.window_start(width);
        let window: Vec<Bar> = self.series.window(width).copied().collect();
        let pattern = self.detector.confirmed(base, &window);
        if let Some(m) = &pattern {
            tracing::debug!(
                instrument = self.instrument(),
                kind = %m.kind,
                confidence = m.confidence,
                neckline = m.neckline_price,
                "pattern confirmed"
            );
        }

        let pullback = self.pullback(prev_close, bar.close);
        let vote = self.aggregator.ma_vote(&crossovers, pullback);
        let signal = self
            .aggregator
            .combine(self.series.instrument(), vote, pattern.as_ref());

        let unrealized = self.positions.unrealized_pnl(bar.close);
        let halted = self.risk.mark(self.series.instrument(), unrealized);

        let mut intents = Vec::new();
        if halted {
            intents = self
                .positions
                .flatten(ExitReason::RiskHalted, bar.close, bar.timestamp);
        } else {
            let managed = self.positions.manage(&bar);
            let mut exits = managed.exits;
            let mut entries = Vec::new();
            let bias = self.aggregator.reconcile(
                signal.clone(),
                self.positions.open_side(),
                self.positions.is_closing(),
            );
            match bias {
                Bias::Hold => {
                    if !signal.is_flat() {
                        tracing::trace!(instrument = self.instrument(), "signal suppressed by open position");
                    }
                }
                Bias::ExitOpposite(_) => {
                    if self.positions.abandon_opening() == 0 {
                        if let Some(id) = self.positions.current().map(|p| p.id) {
                            exits.extend(self.positions.exit(
                                id,
                                ExitReason::OpposingSignal,
                                bar.close,
                                bar.timestamp,
                            ));
                        }
                    }
                }
                Bias::Enter(s) => {
                    if let Some(side) = s.direction.side() {
                        if self.spread_too_wide(&bar) {
                            tracing::debug!(
                                instrument = self.instrument(),
                                spread = ?bar.spread,
                                "entry skipped, spread too wide"
                            );
                        } else {
                            match self.positions.open(side, bar.close, bar.timestamp) {
                                Ok(intent) => entries.push(intent),
                                Err(e @ EngineError::InvalidSizing { .. }) => {
                                    tracing::warn!(error = %e, "entry rejected");
                                }
                                Err(e) => return Err(e),
                            }
                        }
                    }
                }
            }
            intents.append(&mut exits);
            intents.extend(managed.adjustments);
            intents.append(&mut entries);
        }

        for intent in &intents {
            tracing::debug!(%intent, "intent");
        }
        Ok(Cycle {
            bar_index,
            crossovers,
            pattern,
            signal,
            halted,
            intents,
        })
    }

    /// Applies an execution event. Closing a trade books its P&L; if that
    /// halts trading, the remaining positions are flattened right away.
    pub fn on_event(&mut self, event: &ExecutionEvent) -> Result<Vec<Intent>, EngineError> {
        let outcome = self.positions.on_event(event)?;
        let mut intents = outcome.intents;
        if let Some(pnl) = outcome.realized {
            if self.risk.record_realized(self.series.instrument(), pnl) {
                intents.extend(self.flatten(ExitReason::RiskHalted));
            }
        }
        Ok(intents)
    }

    /// Exit intents for every live position at the last seen close.
    pub fn flatten(&mut self, reason: ExitReason) -> Vec<Intent> {
        match self.series.last().copied() {
            Some(bar) => self.positions.flatten(reason, bar.close, bar.timestamp),
            None => Vec::new(),
        }
    }

    fn pullback(&self, prev_close: Option<f64>, close: f64) -> Option<Side> {
        if !self.config.signal.pullback_entries {
            return None;
        }
        let pair = self.config.crossovers.first()?;
        let fast = self.indicators.value(pair.fast)?;
        pullback_bias(self.indicators.trend(pair), fast, prev_close?, close)
    }

    fn spread_too_wide(&self, bar: &Bar) -> bool {
        let limit = self.config.position.pips(self.config.max_spread_pips);
        bar.spread.is_some_and(|s| s > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{IntentAction, IntentId};
    use crate::domain::position::PositionState;
    use crate::domain::signal::Direction;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(minute)
    }

    fn bar(minute: i64, close: f64) -> Bar {
        Bar {
            timestamp: t(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
            spread: None,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            crossovers: vec![CrossoverPair {
                fast: MaSpec::sma(2),
                slow: MaSpec::sma(4),
            }],
            ..EngineConfig::default()
        }
    }

    fn engine(config: EngineConfig) -> StrategyEngine {
        let risk = RiskBook::new(config.risk.clone());
        StrategyEngine::new("EURUSD", config, risk)
    }

    // Falls for 6 bars, then turns up: SMA(2) crosses SMA(4) on the way up.
    fn v_shape() -> Vec<f64> {
        vec![
            1.1060, 1.1050, 1.1040, 1.1030, 1.1020, 1.1010, 1.1030, 1.1060, 1.1090,
        ]
    }

    fn run(engine: &mut StrategyEngine, closes: &[f64]) -> Vec<Intent> {
        let mut all = Vec::new();
        for (i, &c) in closes.iter().enumerate() {
            all.extend(engine.on_bar(bar(i as i64, c)).unwrap());
        }
        all
    }

    #[test]
    fn bullish_crossover_produces_long_entry() {
        let mut e = engine(config());
        let intents = run(&mut e, &v_shape());
        assert_eq!(intents.len(), 1);
        assert!(matches!(intents[0].action, IntentAction::EnterLong { .. }));
        assert_eq!(intents[0].id, IntentId(1));
        assert_eq!(e.positions().current().unwrap().state, PositionState::Opening);
    }

    #[test]
    fn out_of_order_bar_leaves_state_untouched() {
        let mut e = engine(config());
        e.on_bar(bar(5, 1.1)).unwrap();
        let err = e.on_bar(bar(5, 1.2)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrderBar { .. }));
        assert_eq!(e.series().len(), 1);
        assert_eq!(e.indicators().value(MaSpec::sma(2)), None);
    }

    #[test]
    fn same_history_same_intents() {
        let mut a = engine(config());
        let mut b = engine(config());
        assert_eq!(run(&mut a, &v_shape()), run(&mut b, &v_shape()));
    }

    #[test]
    fn wide_spread_suppresses_entry() {
        let mut e = engine(config());
        let closes = v_shape();
        let mut intents = Vec::new();
        for (i, &c) in closes.iter().enumerate() {
            let mut b = bar(i as i64, c);
            b.spread = Some(0.0030);
            intents.extend(e.on_bar(b).unwrap());
        }
        assert!(intents.is_empty());
    }

    #[test]
    fn opposing_signal_abandons_unfilled_entry_then_reassesses() {
        let mut e = engine(config());
        run(&mut e, &v_shape());
        // Turn back down hard for a bearish cross.
        let mut minute = 100;
        let mut seen = Vec::new();
        for c in [1.0990, 1.0900, 1.0850] {
            let cycle = e.step(bar(minute, c)).unwrap();
            minute += 1;
            seen.push(cycle);
        }
        let bearish = seen
            .iter()
            .position(|c| c.signal.direction == Direction::Short)
            .unwrap();
        // The unfilled long is discarded without an exit intent.
        assert!(seen[bearish].intents.is_empty());
        // One cycle later the short is reassessed and entered.
        let next = &seen[bearish + 1];
        assert_eq!(next.intents.len(), 1);
        assert!(matches!(next.intents[0].action, IntentAction::EnterShort { .. }));
    }

    #[test]
    fn fill_then_halt_on_loss_exits() {
        let mut cfg = config();
        cfg.risk.daily_loss_limit = 40.0;
        cfg.position.stop_loss_pips = 100.0;
        cfg.position.max_stop_distance_pips = 500.0;
        let mut e = engine(cfg);
        let entry = run(&mut e, &v_shape()).remove(0);
        e.on_event(&ExecutionEvent::EntryFilled {
            intent: entry.id,
            position: entry.position,
            price: 1.1060,
            timestamp: t(9),
        })
        .unwrap();
        // Size 0.1 lots: 1 pip = 1.0, so 60 pips down breaches the limit.
        let cycle = e.step(bar(10, 1.1000)).unwrap();
        assert!(cycle.halted);
        assert_eq!(cycle.intents.len(), 1);
        assert_eq!(
            cycle.intents[0].action,
            IntentAction::Exit {
                reason: ExitReason::RiskHalted
            }
        );
        assert!(e.risk().is_halted());
    }
}

//! Several instruments sharing one risk book.

use std::collections::BTreeMap;

use crate::domain::bar::Bar;
use crate::domain::engine::{EngineConfig, StrategyEngine};
use crate::domain::error::EngineError;
use crate::domain::intent::{ExecutionEvent, ExitReason, Intent};
use crate::domain::risk::RiskBook;

/// Routes bars and execution events to per-instrument engines.
///
/// An error from one instrument is returned for that call only; no other
/// engine is touched. Once the shared risk book halts, every instrument is
/// flattened in the call that observes it.
#[derive(Debug)]
pub struct TradingSession {
    config: EngineConfig,
    risk: RiskBook,
    engines: BTreeMap<String, StrategyEngine>,
}

impl TradingSession {
    pub fn new<I, S>(config: EngineConfig, instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let risk = RiskBook::new(config.risk.clone());
        let mut session = Self {
            config,
            risk,
            engines: BTreeMap::new(),
        };
        for instrument in instruments {
            session.add_instrument(instrument);
        }
        session
    }

    /// Registers an instrument. Returns false if it was already present.
    pub fn add_instrument(&mut self, instrument: impl Into<String>) -> bool {
        let instrument = instrument.into();
        if self.engines.contains_key(&instrument) {
            return false;
        }
        let engine = StrategyEngine::new(instrument.clone(), self.config.clone(), self.risk.clone());
        self.engines.insert(instrument, engine);
        true
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn engine(&self, instrument: &str) -> Option<&StrategyEngine> {
        self.engines.get(instrument)
    }

    pub fn risk(&self) -> &RiskBook {
        &self.risk
    }

    fn engine_mut(&mut self, instrument: &str) -> Result<&mut StrategyEngine, EngineError> {
        self.engines
            .get_mut(instrument)
            .ok_or_else(|| EngineError::UnknownInstrument {
                instrument: instrument.to_string(),
            })
    }

    pub fn on_bar(&mut self, instrument: &str, bar: Bar) -> Result<Vec<Intent>, EngineError> {
        let mut intents = self.engine_mut(instrument)?.on_bar(bar)?;
        intents.extend(self.flatten_others(instrument));
        Ok(intents)
    }

    pub fn on_event(
        &mut self,
        instrument: &str,
        event: &ExecutionEvent,
    ) -> Result<Vec<Intent>, EngineError> {
        let mut intents = self.engine_mut(instrument)?.on_event(event)?;
        intents.extend(self.flatten_others(instrument));
        Ok(intents)
    }

    fn flatten_others(&mut self, instrument: &str) -> Vec<Intent> {
        if !self.risk.is_halted() {
            return Vec::new();
        }
        self.engines
            .iter_mut()
            .filter(|(name, _)| name.as_str() != instrument)
            .flat_map(|(_, engine)| engine.flatten(ExitReason::RiskHalted))
            .collect()
    }
}

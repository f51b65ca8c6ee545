//! Simulated execution venue.
//!
//! Fills entries and exits at the intent's reference price adjusted for
//! slippage, and rejects entries that would push open notional past the
//! available margin. Events are queued on submit and handed back by
//! `drain_events`, so callers see them only after the hand-off returns.

use std::collections::{BTreeMap, VecDeque};

use crate::domain::error::EngineError;
use crate::domain::intent::{ExecutionEvent, Intent, IntentAction, PositionId};
use crate::domain::signal::Side;
use crate::ports::execution_port::{ExecutionPort, SessionContext};

#[derive(Debug, Clone, PartialEq)]
pub struct PaperVenueConfig {
    pub slippage_pct: f64,
    /// Cap on total open notional. None is unbounded.
    pub margin_available: Option<f64>,
    pub contract_multiplier: f64,
}

impl Default for PaperVenueConfig {
    fn default() -> Self {
        PaperVenueConfig {
            slippage_pct: 0.0,
            margin_available: None,
            contract_multiplier: 100_000.0,
        }
    }
}

/// Buying pays up, selling gives up: a long entry or a short exit fills
/// above `price`, a short entry or a long exit below it.
pub fn apply_slippage(price: f64, side: Side, entering: bool, slippage_pct: f64) -> f64 {
    let buying = (side == Side::Long) == entering;
    if buying {
        price * (1.0 + slippage_pct / 100.0)
    } else {
        price * (1.0 - slippage_pct / 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenLot {
    side: Side,
    notional: f64,
}

#[derive(Debug)]
pub struct PaperVenue {
    context: SessionContext,
    config: PaperVenueConfig,
    open: BTreeMap<(String, PositionId), OpenLot>,
    events: VecDeque<(String, ExecutionEvent)>,
    submitted: usize,
    rejected: usize,
}

impl PaperVenue {
    pub fn new(context: SessionContext, config: PaperVenueConfig) -> Self {
        Self {
            context,
            config,
            open: BTreeMap::new(),
            events: VecDeque::new(),
            submitted: 0,
            rejected: 0,
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn open_positions(&self) -> usize {
        self.open.len()
    }

    fn open_notional(&self) -> f64 {
        self.open.values().map(|lot| lot.notional).sum()
    }

    fn reject(&mut self, intent: &Intent, reason: &str) -> ExecutionEvent {
        self.rejected += 1;
        tracing::debug!(intent = %intent.id, reason, "paper venue rejected intent");
        ExecutionEvent::Rejected {
            intent: intent.id,
            position: intent.position,
            reason: reason.to_string(),
        }
    }

    fn enter(&mut self, intent: &Intent, side: Side, size: f64) -> ExecutionEvent {
        let notional = size * intent.reference_price * self.config.contract_multiplier;
        if let Some(margin) = self.config.margin_available {
            if self.open_notional() + notional > margin {
                return self.reject(intent, "insufficient margin");
            }
        }
        self.open.insert(
            (intent.instrument.clone(), intent.position),
            OpenLot { side, notional },
        );
        ExecutionEvent::EntryFilled {
            intent: intent.id,
            position: intent.position,
            price: apply_slippage(intent.reference_price, side, true, self.config.slippage_pct),
            timestamp: intent.created_at,
        }
    }
}

impl ExecutionPort for PaperVenue {
    fn context(&self) -> &SessionContext {
        &self.context
    }

    fn submit(&mut self, intent: &Intent) -> Result<(), EngineError> {
        self.submitted += 1;
        let key = (intent.instrument.clone(), intent.position);
        let event = match intent.action {
            IntentAction::EnterLong { size, .. } => self.enter(intent, Side::Long, size),
            IntentAction::EnterShort { size, .. } => self.enter(intent, Side::Short, size),
            IntentAction::Exit { .. } => match self.open.remove(&key) {
                Some(lot) => ExecutionEvent::PositionClosed {
                    intent: Some(intent.id),
                    position: intent.position,
                    price: apply_slippage(
                        intent.reference_price,
                        lot.side,
                        false,
                        self.config.slippage_pct,
                    ),
                    timestamp: intent.created_at,
                },
                None => self.reject(intent, "unknown position"),
            },
            IntentAction::AdjustStop { .. } => {
                if self.open.contains_key(&key) {
                    ExecutionEvent::StopAdjusted {
                        intent: intent.id,
                        position: intent.position,
                    }
                } else {
                    self.reject(intent, "unknown position")
                }
            }
        };
        self.events.push_back((intent.instrument.clone(), event));
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<(String, ExecutionEvent)> {
        self.events.drain(..).collect()
    }
}

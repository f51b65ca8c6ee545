//! Position lifecycle for one instrument.
//!
//! The manager sizes entries, hands intents off, ratchets protective stops
//! and reconciles asynchronous venue events against its provisional state.
//! Anything it changes before the venue confirms (a new position, a tighter
//! stop, a position marked closing) is reverted when the venue rejects the
//! intent that caused it.

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;
use crate::domain::intent::{ExecutionEvent, ExitReason, Intent, IntentAction, IntentId, PositionId};
use crate::domain::position::{ClosedTrade, Position, PositionState};
use crate::domain::signal::Side;

/// Sizing and stop-management parameters. Distances are in pips.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionConfig {
    pub pip_size: f64,
    pub stop_loss_pips: f64,
    /// Zero places no take-profit.
    pub take_profit_pips: f64,
    pub break_even: bool,
    pub break_even_trigger_pips: f64,
    pub break_even_offset_pips: f64,
    pub trailing: bool,
    pub trailing_start_pips: f64,
    pub trailing_distance_pips: f64,
    /// When positive, trail by this percentage of price instead of a fixed distance.
    pub trailing_percent: f64,
    /// Account currency risked between entry and initial stop.
    pub risk_per_trade: f64,
    /// Cap on notional (size x price x multiplier).
    pub max_exposure: f64,
    pub max_stop_distance_pips: f64,
    pub lot_step: f64,
    pub contract_multiplier: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        PositionConfig {
            pip_size: 0.0001,
            stop_loss_pips: 50.0,
            take_profit_pips: 100.0,
            break_even: true,
            break_even_trigger_pips: 15.0,
            break_even_offset_pips: 2.0,
            trailing: true,
            trailing_start_pips: 25.0,
            trailing_distance_pips: 10.0,
            trailing_percent: 0.0,
            risk_per_trade: 100.0,
            max_exposure: 100_000.0,
            max_stop_distance_pips: 500.0,
            lot_step: 0.01,
            contract_multiplier: 100_000.0,
        }
    }
}

impl PositionConfig {
    pub fn pips(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    pub fn initial_stop(&self, side: Side, entry: f64) -> f64 {
        entry - side.sign() * self.pips(self.stop_loss_pips)
    }

    pub fn initial_take_profit(&self, side: Side, entry: f64) -> f64 {
        if self.take_profit_pips <= 0.0 {
            return 0.0;
        }
        entry + side.sign() * self.pips(self.take_profit_pips)
    }

    pub fn break_even_stop(&self, side: Side, entry: f64) -> f64 {
        entry + side.sign() * self.pips(self.break_even_offset_pips)
    }

    pub fn trailing_stop(&self, side: Side, price: f64) -> f64 {
        let distance = if self.trailing_percent > 0.0 {
            price * self.trailing_percent / 100.0
        } else {
            self.pips(self.trailing_distance_pips)
        };
        price - side.sign() * distance
    }
}

/// Size for an entry at `entry` protected by `stop`.
///
/// The smaller of the risk-based and exposure-based sizes, floored to the
/// lot step. Anything that would come out at zero is rejected, never clamped.
pub fn position_size(
    instrument: &str,
    config: &PositionConfig,
    entry: f64,
    stop: f64,
) -> Result<f64, EngineError> {
    let invalid = |reason: String| EngineError::InvalidSizing {
        instrument: instrument.to_string(),
        reason,
    };

    if !entry.is_finite() || !stop.is_finite() || entry <= 0.0 || stop <= 0.0 {
        return Err(invalid(format!("non-positive price (entry {entry}, stop {stop})")));
    }
    let distance = (entry - stop).abs();
    if distance == 0.0 {
        return Err(invalid("stop distance is zero".into()));
    }
    let max_distance = config.pips(config.max_stop_distance_pips);
    if distance > max_distance {
        return Err(invalid(format!(
            "stop distance {distance:.5} exceeds maximum {max_distance:.5}"
        )));
    }

    let by_risk = config.risk_per_trade / (distance * config.contract_multiplier);
    let by_exposure = config.max_exposure / (entry * config.contract_multiplier);
    let raw = by_risk.min(by_exposure);
    // Tolerate representation error so 0.2 / 0.01 does not floor to 19.
    let lots = (raw / config.lot_step + 1e-9).floor();
    let size = lots * config.lot_step;
    if size <= 0.0 || !size.is_finite() {
        return Err(invalid(format!("size {raw:.4} is below one lot step")));
    }
    Ok(size)
}

/// Stop change proposed by break-even or trailing logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopUpdate {
    /// New stop, only when strictly tighter than the current one.
    pub stop: Option<f64>,
    /// Promote to `BreakEvenArmed`.
    pub arm: bool,
}

fn tighter(side: Side, a: f64, b: f64) -> f64 {
    match side {
        Side::Long => a.max(b),
        Side::Short => a.min(b),
    }
}

/// Break-even and trailing evaluation for a live position at `price`.
///
/// Reaching the trailing start on an unarmed position arms break-even first.
/// The returned stop never loosens the current one.
pub fn next_stop(config: &PositionConfig, position: &Position, price: f64) -> Option<StopUpdate> {
    let moved = position.favourable_move(price);
    let reaches_trailing = config.trailing && moved >= config.pips(config.trailing_start_pips);

    let mut arm = false;
    let mut candidate = None;
    if !position.break_even_armed {
        let reaches_break_even =
            config.break_even && moved >= config.pips(config.break_even_trigger_pips);
        if reaches_break_even || reaches_trailing {
            arm = true;
            candidate = Some(config.break_even_stop(position.side, position.entry_price));
        }
    }
    if (position.break_even_armed || arm) && reaches_trailing {
        let trail = config.trailing_stop(position.side, price);
        candidate = Some(match candidate {
            Some(c) => tighter(position.side, c, trail),
            None => trail,
        });
    }

    let stop = candidate.filter(|&c| position.tightens(c));
    if !arm && stop.is_none() {
        return None;
    }
    Some(StopUpdate { stop, arm })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Entry,
    Exit,
    /// Values to restore if the adjustment is rejected.
    AdjustStop {
        stop: f64,
        armed: bool,
        state: PositionState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingIntent {
    position: PositionId,
    kind: Pending,
}

/// Intents produced by per-bar management, in emission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Managed {
    pub exits: Vec<Intent>,
    pub adjustments: Vec<Intent>,
}

/// What applying one execution event produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutcome {
    pub intents: Vec<Intent>,
    /// P&L booked by a close.
    pub realized: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PositionManager {
    instrument: String,
    config: PositionConfig,
    /// Newest last. Fills for abandoned entries are inserted at the front.
    positions: Vec<Position>,
    pending: BTreeMap<IntentId, PendingIntent>,
    /// Abandoned entries, kept so a late fill can be unwound.
    superseded: BTreeMap<IntentId, Position>,
    closed: Vec<ClosedTrade>,
    next_intent: u64,
    next_position: u64,
}

impl PositionManager {
    pub fn new(instrument: impl Into<String>, config: PositionConfig) -> Self {
        Self {
            instrument: instrument.into(),
            config,
            positions: Vec::new(),
            pending: BTreeMap::new(),
            superseded: BTreeMap::new(),
            closed: Vec::new(),
            next_intent: 1,
            next_position: 1,
        }
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// The position new signals are reconciled against.
    pub fn current(&self) -> Option<&Position> {
        self.positions.last()
    }

    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.iter().find(|p| p.id == id)
    }

    /// Lifecycle state of a position this manager has handled. A closed
    /// position leaves the book and reports `Closed`.
    pub fn state_of(&self, id: PositionId) -> Option<PositionState> {
        self.position(id).map(|p| p.state).or_else(|| {
            self.closed
                .iter()
                .any(|t| t.position == id)
                .then_some(PositionState::Closed)
        })
    }

    pub fn open_side(&self) -> Option<Side> {
        self.current().map(|p| p.side)
    }

    pub fn is_closing(&self) -> bool {
        self.current()
            .is_some_and(|p| p.state == PositionState::Closing)
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    pub fn realized_pnl(&self) -> f64 {
        self.closed.iter().map(|t| t.pnl).sum()
    }

    /// Intents handed off and not yet acknowledged.
    pub fn pending_intents(&self) -> usize {
        self.pending.len()
    }

    /// Open P&L across filled positions.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.state != PositionState::Opening)
            .map(|p| p.unrealized_pnl(price, self.config.contract_multiplier))
            .sum()
    }

    fn intent(
        &mut self,
        position: PositionId,
        action: IntentAction,
        reference_price: f64,
        at: NaiveDateTime,
    ) -> Intent {
        let id = IntentId(self.next_intent);
        self.next_intent += 1;
        Intent {
            id,
            instrument: self.instrument.clone(),
            position,
            action,
            reference_price,
            created_at: at,
        }
    }

    /// Creates a provisional position and its entry intent.
    pub fn open(&mut self, side: Side, price: f64, at: NaiveDateTime) -> Result<Intent, EngineError> {
        let stop = self.config.initial_stop(side, price);
        let take_profit = self.config.initial_take_profit(side, price);
        let size = position_size(&self.instrument, &self.config, price, stop)?;

        let id = PositionId(self.next_position);
        self.next_position += 1;
        let intent = self.intent(id, Intent::enter(side, size, stop, take_profit), price, at);

        self.positions.push(Position {
            id,
            instrument: self.instrument.clone(),
            side,
            entry_price: price,
            size,
            stop_price: stop,
            take_profit,
            break_even_armed: false,
            opened_at: at,
            state: PositionState::Opening,
            entry_intent: intent.id,
            resume_state: None,
        });
        self.pending.insert(
            intent.id,
            PendingIntent {
                position: id,
                kind: Pending::Entry,
            },
        );
        tracing::info!(
            instrument = %self.instrument,
            position = %id,
            intent = %intent.id,
            %side,
            size,
            stop,
            take_profit,
            "entry handed off"
        );
        Ok(intent)
    }

    /// Exit intent for a live position; it moves to `Closing`.
    pub fn exit(
        &mut self,
        id: PositionId,
        reason: ExitReason,
        price: f64,
        at: NaiveDateTime,
    ) -> Option<Intent> {
        let position = self
            .positions
            .iter_mut()
            .find(|p| p.id == id && p.state.is_live())?;
        position.resume_state = Some(position.state);
        position.state = PositionState::Closing;

        // An exit supersedes any stop adjustment still in flight.
        self.pending
            .retain(|_, p| !(p.position == id && matches!(p.kind, Pending::AdjustStop { .. })));

        let intent = self.intent(id, IntentAction::Exit { reason }, price, at);
        self.pending.insert(
            intent.id,
            PendingIntent {
                position: id,
                kind: Pending::Exit,
            },
        );
        tracing::info!(
            instrument = %self.instrument,
            position = %id,
            intent = %intent.id,
            %reason,
            "exit handed off"
        );
        Some(intent)
    }

    /// Discards unfilled entries. Their intents are marked superseded so a
    /// late fill is unwound instead of adopted.
    pub fn abandon_opening(&mut self) -> usize {
        let (opening, rest): (Vec<Position>, Vec<Position>) = std::mem::take(&mut self.positions)
            .into_iter()
            .partition(|p| p.state == PositionState::Opening);
        self.positions = rest;
        let count = opening.len();
        for position in opening {
            self.pending.remove(&position.entry_intent);
            tracing::info!(
                instrument = %self.instrument,
                position = %position.id,
                intent = %position.entry_intent,
                "unfilled entry superseded"
            );
            self.superseded.insert(position.entry_intent, position);
        }
        count
    }

    /// Exits every live position and abandons unfilled entries.
    pub fn flatten(&mut self, reason: ExitReason, price: f64, at: NaiveDateTime) -> Vec<Intent> {
        self.abandon_opening();
        let live: Vec<PositionId> = self
            .positions
            .iter()
            .filter(|p| p.state.is_live())
            .map(|p| p.id)
            .collect();
        live.into_iter()
            .filter_map(|id| self.exit(id, reason, price, at))
            .collect()
    }

    /// Per-bar management of live positions: stop and take-profit breaches
    /// on the bar's extremes first, then break-even and trailing.
    pub fn manage(&mut self, bar: &Bar) -> Managed {
        let mut managed = Managed::default();
        let live: Vec<PositionId> = self
            .positions
            .iter()
            .filter(|p| p.state.is_live())
            .map(|p| p.id)
            .collect();

        for id in live {
            let Some(position) = self.position(id) else {
                continue;
            };
            // Protective exits reference the level that was breached.
            let breach = if position.stop_hit(bar.low, bar.high) {
                Some((ExitReason::StopHit, position.stop_price))
            } else if position.take_profit_hit(bar.low, bar.high) {
                Some((ExitReason::TakeProfitHit, position.take_profit))
            } else {
                None
            };
            if let Some((reason, level)) = breach {
                managed
                    .exits
                    .extend(self.exit(id, reason, level, bar.timestamp));
                continue;
            }

            if let Some(update) = next_stop(&self.config, position, bar.close) {
                managed
                    .adjustments
                    .extend(self.apply_stop(id, update, bar.close, bar.timestamp));
            }
        }
        managed
    }

    fn apply_stop(
        &mut self,
        id: PositionId,
        update: StopUpdate,
        price: f64,
        at: NaiveDateTime,
    ) -> Option<Intent> {
        // A rejection restores the last state the venue acknowledged, which
        // predates any adjustment this one supersedes.
        let superseded = self
            .pending
            .iter()
            .find(|(_, p)| p.position == id && matches!(p.kind, Pending::AdjustStop { .. }))
            .map(|(intent, p)| (*intent, p.kind));

        let position = self.positions.iter_mut().find(|p| p.id == id)?;
        let restore = match superseded {
            Some((_, kind)) => kind,
            None => Pending::AdjustStop {
                stop: position.stop_price,
                armed: position.break_even_armed,
                state: position.state,
            },
        };

        if update.arm {
            position.break_even_armed = true;
            position.state = PositionState::BreakEvenArmed;
            tracing::debug!(instrument = %self.instrument, position = %id, "break-even armed");
        }
        let stop = update.stop?;
        position.stop_price = stop;

        if let Some((older, _)) = superseded {
            self.pending.remove(&older);
            tracing::debug!(instrument = %self.instrument, intent = %older, "stop adjustment superseded");
        }
        let intent = self.intent(id, IntentAction::AdjustStop { stop }, price, at);
        self.pending.insert(
            intent.id,
            PendingIntent {
                position: id,
                kind: restore,
            },
        );
        tracing::debug!(
            instrument = %self.instrument,
            position = %id,
            intent = %intent.id,
            stop,
            "stop adjustment handed off"
        );
        Some(intent)
    }

    /// Applies a venue acknowledgement. A rejection of a pending intent
    /// reverts its provisional state and is reported as `VenueRejection`;
    /// acknowledgements for superseded or unknown intents are ignored.
    pub fn on_event(&mut self, event: &ExecutionEvent) -> Result<EventOutcome, EngineError> {
        match event {
            ExecutionEvent::EntryFilled {
                intent,
                price,
                timestamp,
                ..
            } => Ok(self.on_entry_filled(*intent, *price, *timestamp)),
            ExecutionEvent::PositionClosed {
                intent,
                position,
                price,
                timestamp,
            } => Ok(self.on_closed(*intent, *position, *price, *timestamp)),
            ExecutionEvent::StopAdjusted { intent, .. } => {
                if self.pending.remove(intent).is_none() {
                    tracing::debug!(instrument = %self.instrument, %intent, "ignoring stale stop acknowledgement");
                }
                Ok(EventOutcome::default())
            }
            ExecutionEvent::Rejected { intent, reason, .. } => self.on_rejected(*intent, reason),
        }
    }

    fn on_entry_filled(&mut self, intent: IntentId, price: f64, at: NaiveDateTime) -> EventOutcome {
        if let Some(mut orphan) = self.superseded.remove(&intent) {
            orphan.state = PositionState::Open;
            orphan.entry_price = price;
            orphan.opened_at = at;
            let id = orphan.id;
            self.positions.insert(0, orphan);
            tracing::info!(instrument = %self.instrument, position = %id, %intent, "late fill for superseded entry");
            return EventOutcome {
                intents: self.exit(id, ExitReason::Superseded, price, at).into_iter().collect(),
                realized: None,
            };
        }

        let Some(PendingIntent {
            position: id,
            kind: Pending::Entry,
        }) = self.pending.get(&intent).copied()
        else {
            tracing::debug!(instrument = %self.instrument, %intent, "ignoring fill for unknown entry");
            return EventOutcome::default();
        };
        self.pending.remove(&intent);

        if let Some(position) = self
            .positions
            .iter_mut()
            .find(|p| p.id == id && p.state == PositionState::Opening)
        {
            position.state = PositionState::Open;
            position.entry_price = price;
            position.opened_at = at;
            tracing::info!(instrument = %self.instrument, position = %id, price, "entry filled");
        }
        EventOutcome::default()
    }

    fn on_closed(
        &mut self,
        intent: Option<IntentId>,
        id: PositionId,
        price: f64,
        at: NaiveDateTime,
    ) -> EventOutcome {
        if let Some(intent) = intent {
            self.pending.remove(&intent);
        }
        let Some(index) = self
            .positions
            .iter()
            .position(|p| p.id == id && p.state != PositionState::Opening)
        else {
            tracing::debug!(instrument = %self.instrument, position = %id, "ignoring close for unknown position");
            return EventOutcome::default();
        };

        let position = self.positions.remove(index);
        self.pending.retain(|_, p| p.position != id);
        let pnl = position.unrealized_pnl(price, self.config.contract_multiplier);
        tracing::info!(instrument = %self.instrument, position = %id, price, pnl, "position closed");
        self.closed.push(ClosedTrade {
            position: id,
            instrument: position.instrument,
            side: position.side,
            size: position.size,
            entry_price: position.entry_price,
            exit_price: price,
            opened_at: position.opened_at,
            closed_at: at,
            pnl,
        });
        EventOutcome {
            intents: Vec::new(),
            realized: Some(pnl),
        }
    }

    fn on_rejected(&mut self, intent: IntentId, reason: &str) -> Result<EventOutcome, EngineError> {
        let Some(pending) = self.pending.remove(&intent) else {
            if self.superseded.remove(&intent).is_some() {
                tracing::debug!(instrument = %self.instrument, %intent, "superseded entry rejected");
            }
            return Ok(EventOutcome::default());
        };

        match pending.kind {
            Pending::Entry => self.positions.retain(|p| p.id != pending.position),
            Pending::Exit => {
                if let Some(position) = self
                    .positions
                    .iter_mut()
                    .find(|p| p.id == pending.position && p.state == PositionState::Closing)
                {
                    position.state = position.resume_state.take().unwrap_or(PositionState::Open);
                }
            }
            Pending::AdjustStop { stop, armed, state } => {
                if let Some(position) = self
                    .positions
                    .iter_mut()
                    .find(|p| p.id == pending.position && p.state.is_live())
                {
                    position.stop_price = stop;
                    position.break_even_armed = armed;
                    position.state = state;
                }
            }
        }
        tracing::warn!(
            instrument = %self.instrument,
            position = %pending.position,
            %intent,
            reason,
            "venue rejected intent, provisional state reverted"
        );
        Err(EngineError::VenueRejection {
            intent_id: intent,
            reason: reason.to_string(),
        })
    }
}

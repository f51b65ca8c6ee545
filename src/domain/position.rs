//! Position lifecycle state and stop/take-profit checks.

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::intent::{IntentId, PositionId};
use crate::domain::signal::Side;

/// `Opening → Open → BreakEvenArmed → Closing → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionState {
    /// Entry intent handed off, fill not yet confirmed.
    Opening,
    Open,
    BreakEvenArmed,
    /// Exit intent handed off, close not yet confirmed.
    Closing,
    Closed,
}

impl PositionState {
    pub fn is_live(self) -> bool {
        matches!(self, PositionState::Open | PositionState::BreakEvenArmed)
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionState::Opening => "opening",
            PositionState::Open => "open",
            PositionState::BreakEvenArmed => "break_even_armed",
            PositionState::Closing => "closing",
            PositionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: PositionId,
    pub instrument: String,
    pub side: Side,
    pub entry_price: f64,
    pub size: f64,
    pub stop_price: f64,
    pub take_profit: f64,
    pub break_even_armed: bool,
    pub opened_at: NaiveDateTime,
    pub state: PositionState,
    /// Intent that opened the position.
    pub entry_intent: IntentId,
    /// State to fall back to if an exit is rejected.
    pub(crate) resume_state: Option<PositionState>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    pub fn is_short(&self) -> bool {
        self.side == Side::Short
    }

    /// Price distance moved in the position's favour (negative when against).
    pub fn favourable_move(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price)
    }

    pub fn unrealized_pnl(&self, price: f64, multiplier: f64) -> f64 {
        self.favourable_move(price) * self.size * multiplier
    }

    /// Breached by the bar's adverse extreme.
    pub fn stop_hit(&self, low: f64, high: f64) -> bool {
        if self.is_long() {
            low <= self.stop_price
        } else {
            high >= self.stop_price
        }
    }

    /// Reached by the bar's favourable extreme. Zero disables.
    pub fn take_profit_hit(&self, low: f64, high: f64) -> bool {
        if self.take_profit == 0.0 {
            return false;
        }
        if self.is_long() {
            high >= self.take_profit
        } else {
            low <= self.take_profit
        }
    }

    /// True when `candidate` is strictly tighter than the current stop.
    pub fn tightens(&self, candidate: f64) -> bool {
        if self.is_long() {
            candidate > self.stop_price
        } else {
            candidate < self.stop_price
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub position: PositionId,
    pub instrument: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: NaiveDateTime,
    pub closed_at: NaiveDateTime,
    pub pnl: f64,
}

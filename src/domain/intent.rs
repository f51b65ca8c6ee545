//! Order intents emitted by the engine and the execution events that
//! acknowledge them.

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::signal::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntentId(pub u64);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    OpposingSignal,
    StopHit,
    TakeProfitHit,
    /// Daily loss limit or profit target reached.
    RiskHalted,
    /// A fill arrived for an entry that a newer cycle had already abandoned.
    Superseded,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::OpposingSignal => "opposing_signal",
            ExitReason::StopHit => "stop_hit",
            ExitReason::TakeProfitHit => "take_profit_hit",
            ExitReason::RiskHalted => "risk_halted",
            ExitReason::Superseded => "superseded",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntentAction {
    EnterLong {
        size: f64,
        stop: f64,
        take_profit: f64,
    },
    EnterShort {
        size: f64,
        stop: f64,
        take_profit: f64,
    },
    Exit {
        reason: ExitReason,
    },
    AdjustStop {
        stop: f64,
    },
}

/// A proposed order action. Submission is the execution collaborator's job.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub id: IntentId,
    pub instrument: String,
    pub position: PositionId,
    pub action: IntentAction,
    /// Last close when the intent was produced.
    pub reference_price: f64,
    pub created_at: NaiveDateTime,
}

impl Intent {
    pub fn enter(side: Side, size: f64, stop: f64, take_profit: f64) -> IntentAction {
        match side {
            Side::Long => IntentAction::EnterLong {
                size,
                stop,
                take_profit,
            },
            Side::Short => IntentAction::EnterShort {
                size,
                stop,
                take_profit,
            },
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(
            self.action,
            IntentAction::EnterLong { .. } | IntentAction::EnterShort { .. }
        )
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.action, IntentAction::Exit { .. })
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} ", self.created_at, self.id, self.instrument)?;
        match self.action {
            IntentAction::EnterLong {
                size,
                stop,
                take_profit,
            } => write!(
                f,
                "enter_long {} size={size:.2} stop={stop:.5} tp={take_profit:.5}",
                self.position
            ),
            IntentAction::EnterShort {
                size,
                stop,
                take_profit,
            } => write!(
                f,
                "enter_short {} size={size:.2} stop={stop:.5} tp={take_profit:.5}",
                self.position
            ),
            IntentAction::Exit { reason } => write!(f, "exit {} reason={reason}", self.position),
            IntentAction::AdjustStop { stop } => {
                write!(f, "adjust_stop {} stop={stop:.5}", self.position)
            }
        }
    }
}

/// Asynchronous acknowledgement from the execution collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    EntryFilled {
        intent: IntentId,
        position: PositionId,
        price: f64,
        timestamp: NaiveDateTime,
    },
    /// `intent` is None when the venue closed the position on its own
    /// (e.g. a resting stop order).
    PositionClosed {
        intent: Option<IntentId>,
        position: PositionId,
        price: f64,
        timestamp: NaiveDateTime,
    },
    StopAdjusted {
        intent: IntentId,
        position: PositionId,
    },
    Rejected {
        intent: IntentId,
        position: PositionId,
        reason: String,
    },
}

impl ExecutionEvent {
    pub fn position(&self) -> PositionId {
        match self {
            ExecutionEvent::EntryFilled { position, .. }
            | ExecutionEvent::PositionClosed { position, .. }
            | ExecutionEvent::StopAdjusted { position, .. }
            | ExecutionEvent::Rejected { position, .. } => *position,
        }
    }
}

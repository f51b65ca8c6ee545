//! Domain error types.
//!
//! Insufficient history and risk halts are not errors: the first is a
//! readiness state of the indicator layer, the second an exit reason.

use chrono::NaiveDateTime;

use crate::domain::intent::IntentId;

/// Top-level error type for futurebreakout.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("out-of-order bar for {instrument}: {timestamp} is not after {last}")]
    OutOfOrderBar {
        instrument: String,
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("invalid sizing for {instrument}: {reason}")]
    InvalidSizing { instrument: String, reason: String },

    #[error("venue rejected intent {intent_id}: {reason}")]
    VenueRejection { intent_id: IntentId, reason: String },

    #[error("unknown instrument {instrument}")]
    UnknownInstrument { instrument: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::Data { .. }
            | EngineError::OutOfOrderBar { .. }
            | EngineError::UnknownInstrument { .. } => 3,
            EngineError::InvalidSizing { .. } | EngineError::VenueRejection { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}

//! Execution venue port.

use crate::domain::error::EngineError;
use crate::domain::intent::{ExecutionEvent, Intent};

/// Account and server identity handed to the venue explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub account: Option<String>,
    pub server: Option<String>,
}

/// Accepts intents without blocking the caller. Fills, closes and
/// rejections come back later through `drain_events`, tagged with the
/// instrument they belong to.
pub trait ExecutionPort {
    fn context(&self) -> &SessionContext;

    fn submit(&mut self, intent: &Intent) -> Result<(), EngineError>;

    fn drain_events(&mut self) -> Vec<(String, ExecutionEvent)>;
}

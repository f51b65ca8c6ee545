//! Market-data port.

use crate::domain::bar::Bar;
use crate::domain::error::EngineError;

/// Supplies bars per instrument in timestamp order. Missing bars are simply
/// absent; nothing is interpolated.
pub trait MarketDataPort {
    fn fetch_bars(&self, instrument: &str) -> Result<Vec<Bar>, EngineError>;

    fn list_instruments(&self) -> Result<Vec<String>, EngineError>;
}

//! Market data access port trait.

use crate::domain::error::StockpickError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::pick::Candidate;

pub trait DataPort {
    /// Most recent `days` daily bars for `symbol`, oldest first.
    fn fetch_bars(&self, symbol: &str, days: usize) -> Result<Vec<OhlcvBar>, StockpickError>;

    /// Candidate pool for a recommendation run.
    fn candidate_pool(&self) -> Result<Vec<Candidate>, StockpickError>;
}

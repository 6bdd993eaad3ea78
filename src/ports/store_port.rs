//! Persistence port trait for recommendations, screener records,
//! watchlists and key/value settings.

use crate::domain::error::StockpickError;
use crate::domain::pick::StockPick;
use crate::domain::recommend::RecommendationReport;
use crate::domain::screener::{NewScreenerRecord, ScreenerRecord};
use crate::domain::watchlist::{NewWatchStock, WatchGroup, WatchStock};
use chrono::NaiveDate;

pub trait StorePort {
    /// Store the picks of a run. A symbol appears at most once per date;
    /// re-running a day replaces all of its earlier rows.
    fn save_recommendations(&self, report: &RecommendationReport) -> Result<usize, StockpickError>;

    /// Picks stored for `date`, best first.
    fn recommendations_for(&self, date: NaiveDate) -> Result<Vec<StockPick>, StockpickError>;

    fn save_screener_record(&self, record: &NewScreenerRecord) -> Result<i64, StockpickError>;

    /// Newest first, without full results.
    fn list_screener_records(&self, limit: usize) -> Result<Vec<ScreenerRecord>, StockpickError>;

    fn get_screener_record(&self, id: i64) -> Result<Option<ScreenerRecord>, StockpickError>;

    fn delete_screener_record(&self, id: i64) -> Result<bool, StockpickError>;

    fn get_config_value(&self, key: &str) -> Result<Option<String>, StockpickError>;

    fn set_config_value(&self, key: &str, value: &str) -> Result<(), StockpickError>;

    /// All settings whose key starts with `prefix`, ordered by key.
    fn config_values(&self, prefix: &str) -> Result<Vec<(String, String)>, StockpickError>;

    /// Ordered by sort order then id, with stock counts.
    fn list_watch_groups(&self) -> Result<Vec<WatchGroup>, StockpickError>;

    /// New groups sort after every existing one.
    fn add_watch_group(&self, name: &str) -> Result<WatchGroup, StockpickError>;

    fn rename_watch_group(&self, id: i64, name: &str) -> Result<bool, StockpickError>;

    /// Deletes the group and its stocks. The holdings group is refused.
    fn delete_watch_group(&self, id: i64) -> Result<bool, StockpickError>;

    /// Newest first.
    fn list_watch_stocks(&self, group_id: i64) -> Result<Vec<WatchStock>, StockpickError>;

    /// Fails when the symbol is already in the group.
    fn add_watch_stock(&self, stock: &NewWatchStock) -> Result<WatchStock, StockpickError>;

    fn remove_watch_stock(&self, group_id: i64, symbol: &str) -> Result<bool, StockpickError>;
}

//! Watchlist groups and the stocks saved in them.
//!
//! A symbol appears at most once per group. The holdings group always
//! exists and cannot be deleted.

use crate::domain::error::StockpickError;
use crate::domain::market::{Market, exchange_symbol};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Created when the store has no groups at all.
pub const DEFAULT_GROUP: &str = "默认自选";
/// Always present, sorted first.
pub const HOLDINGS_GROUP: &str = "持有股";

pub const DEFAULT_GROUP_ORDER: i64 = 0;
pub const HOLDINGS_GROUP_ORDER: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchGroup {
    pub id: i64,
    pub name: String,
    pub sort_order: i64,
    pub created_at: NaiveDateTime,
    pub stock_count: usize,
}

impl WatchGroup {
    pub fn is_holdings(&self) -> bool {
        self.name == HOLDINGS_GROUP
    }

    /// Err for the holdings group.
    pub fn check_deletable(&self) -> Result<(), StockpickError> {
        if self.is_holdings() {
            return Err(StockpickError::Watchlist {
                reason: format!("the {HOLDINGS_GROUP} group cannot be deleted"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchStock {
    pub id: i64,
    pub group_id: i64,
    pub symbol: String,
    pub stock_name: String,
    pub market: Market,
    pub note: String,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWatchStock {
    pub group_id: i64,
    pub symbol: String,
    pub stock_name: String,
    pub market: Market,
    pub note: String,
}

impl NewWatchStock {
    /// A-share codes are stored in `sh.`/`sz.` form, other markets as
    /// entered, uppercased.
    pub fn new(group_id: i64, code: &str, stock_name: &str, note: &str) -> Self {
        let market = Market::detect(code);
        let symbol = match market {
            Market::AShare => exchange_symbol(code),
            _ => code.trim().to_ascii_uppercase(),
        };
        Self {
            group_id,
            symbol,
            stock_name: stock_name.trim().to_string(),
            market,
            note: note.trim().to_string(),
        }
    }

    pub fn duplicate_error(&self) -> StockpickError {
        StockpickError::Watchlist {
            reason: format!("{} is already in group {}", self.symbol, self.group_id),
        }
    }
}

pub fn validate_group_name(name: &str) -> Result<String, StockpickError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StockpickError::Watchlist {
            reason: "group name must not be empty".into(),
        });
    }
    Ok(name.to_string())
}

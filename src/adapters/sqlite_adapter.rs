//! SQLite store adapter.

use crate::domain::error::StockpickError;
use crate::domain::pick::StockPick;
use crate::domain::recommend::RecommendationReport;
use crate::domain::market::Market;
use crate::domain::screener::{NewScreenerRecord, ScreenSummary, ScreenerRecord};
use crate::domain::watchlist::{
    DEFAULT_GROUP, DEFAULT_GROUP_ORDER, HOLDINGS_GROUP, HOLDINGS_GROUP_ORDER, NewWatchStock,
    WatchGroup, WatchStock, validate_group_name,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;
use chrono::{NaiveDate, NaiveDateTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{ErrorCode, OptionalExtension, Row, params};
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_error(e: rusqlite::Error) -> StockpickError {
    StockpickError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn json_column<T: serde::de::DeserializeOwned>(
    index: usize,
    text: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn timestamp_column(index: usize, text: &str) -> Result<NaiveDateTime, rusqlite::Error> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn market_column(index: usize, text: String) -> Result<Market, rusqlite::Error> {
    serde_json::from_value(serde_json::Value::String(text)).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn market_text(market: Market) -> Result<String, StockpickError> {
    match serde_json::to_value(market)? {
        serde_json::Value::String(text) => Ok(text),
        other => Ok(other.to_string()),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

const WATCH_GROUP_COLUMNS: &str = "g.id, g.name, g.sort_order, g.created_at,
    (SELECT COUNT(*) FROM watchlist_stocks s WHERE s.group_id = g.id)";

fn watch_group_row(row: &Row<'_>) -> Result<WatchGroup, rusqlite::Error> {
    let created_at: String = row.get(3)?;
    let count: i64 = row.get(4)?;
    Ok(WatchGroup {
        id: row.get(0)?,
        name: row.get(1)?,
        sort_order: row.get(2)?,
        created_at: timestamp_column(3, &created_at)?,
        stock_count: count.max(0) as usize,
    })
}

const WATCH_STOCK_COLUMNS: &str = "id, group_id, symbol, stock_name, market, note, added_at";

fn watch_stock_row(row: &Row<'_>) -> Result<WatchStock, rusqlite::Error> {
    let added_at: String = row.get(6)?;
    Ok(WatchStock {
        id: row.get(0)?,
        group_id: row.get(1)?,
        symbol: row.get(2)?,
        stock_name: row.get(3)?,
        market: market_column(4, row.get(4)?)?,
        note: row.get(5)?,
        added_at: timestamp_column(6, &added_at)?,
    })
}

fn now_text() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StockpickError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| StockpickError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| StockpickError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, StockpickError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| StockpickError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StockpickError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| StockpickError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), StockpickError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stock_recommendations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rec_date TEXT NOT NULL,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                total_score REAL NOT NULL,
                confidence TEXT NOT NULL,
                entry_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                target_price REAL NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (rec_date, symbol)
            );
            CREATE INDEX IF NOT EXISTS idx_recommendations_date ON stock_recommendations(rec_date);
            CREATE TABLE IF NOT EXISTS screener_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                conditions TEXT NOT NULL,
                preset_key TEXT,
                result_count INTEGER NOT NULL,
                result_symbols TEXT NOT NULL,
                result_summary TEXT NOT NULL,
                result_data TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS system_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS watchlist_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS watchlist_stocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL REFERENCES watchlist_groups(id),
                symbol TEXT NOT NULL,
                stock_name TEXT NOT NULL DEFAULT '',
                market TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                added_at TEXT NOT NULL,
                UNIQUE (group_id, symbol)
            );
            CREATE INDEX IF NOT EXISTS idx_watchlist_stocks_group ON watchlist_stocks(group_id);",
        )
        .map_err(|e: rusqlite::Error| StockpickError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        self.ensure_default_groups()
    }

    /// A default group when there are none, and the holdings group.
    fn ensure_default_groups(&self) -> Result<(), StockpickError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let groups: i64 = tx
            .query_row("SELECT COUNT(*) FROM watchlist_groups", [], |row| row.get(0))
            .map_err(query_error)?;
        let insert = "INSERT INTO watchlist_groups (name, sort_order, created_at) VALUES (?1, ?2, ?3)";
        if groups == 0 {
            tx.execute(insert, params![DEFAULT_GROUP, DEFAULT_GROUP_ORDER, now_text()])
                .map_err(query_error)?;
        }
        let holdings: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM watchlist_groups WHERE name = ?1",
                params![HOLDINGS_GROUP],
                |row| row.get(0),
            )
            .map_err(query_error)?;
        if holdings == 0 {
            tx.execute(insert, params![HOLDINGS_GROUP, HOLDINGS_GROUP_ORDER, now_text()])
                .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    fn watch_group(
        conn: &rusqlite::Connection,
        id: i64,
    ) -> Result<Option<WatchGroup>, StockpickError> {
        conn.query_row(
            &format!("SELECT {WATCH_GROUP_COLUMNS} FROM watchlist_groups g WHERE g.id = ?1"),
            params![id],
            watch_group_row,
        )
        .optional()
        .map_err(query_error)
    }
}

impl StorePort for SqliteAdapter {
    fn save_recommendations(&self, report: &RecommendationReport) -> Result<usize, StockpickError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let date = report.date.format("%Y-%m-%d").to_string();
        let created_at = now_text();

        tx.execute(
            "DELETE FROM stock_recommendations WHERE rec_date = ?1",
            params![date],
        )
        .map_err(query_error)?;
        for pick in &report.picks {
            let data = serde_json::to_string(pick)?;
            tx.execute(
                "INSERT INTO stock_recommendations
                 (rec_date, symbol, name, total_score, confidence, entry_price, stop_loss,
                  target_price, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    date,
                    pick.symbol,
                    pick.name,
                    pick.total_score,
                    pick.confidence.to_string(),
                    pick.entry_price,
                    pick.stop_loss,
                    pick.target_price,
                    data,
                    created_at
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        debug!(date = %date, picks = report.picks.len(), "recommendations saved");
        Ok(report.picks.len())
    }

    fn recommendations_for(&self, date: NaiveDate) -> Result<Vec<StockPick>, StockpickError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT data FROM stock_recommendations
                 WHERE rec_date = ?1 ORDER BY total_score DESC, symbol ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![date.format("%Y-%m-%d").to_string()], |row| {
                let data: String = row.get(0)?;
                json_column::<StockPick>(0, &data)
            })
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn save_screener_record(&self, record: &NewScreenerRecord) -> Result<i64, StockpickError> {
        let conn = self.conn()?;
        let summary = record.summary();
        conn.execute(
            "INSERT INTO screener_records
             (name, conditions, preset_key, result_count, result_symbols, result_summary,
              result_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.name,
                serde_json::to_string(&record.conditions)?,
                record.preset_key,
                record.results.len() as i64,
                serde_json::to_string(&record.symbols())?,
                serde_json::to_string(&summary)?,
                serde_json::to_string(&record.results)?,
                now_text()
            ],
        )
        .map_err(query_error)?;
        Ok(conn.last_insert_rowid())
    }

    fn list_screener_records(&self, limit: usize) -> Result<Vec<ScreenerRecord>, StockpickError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, conditions, preset_key, result_count, result_symbols,
                        result_summary, created_at
                 FROM screener_records ORDER BY created_at DESC, id DESC LIMIT ?1",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let conditions: String = row.get(2)?;
                let symbols: String = row.get(5)?;
                let summary: String = row.get(6)?;
                let created_at: String = row.get(7)?;
                let count: i64 = row.get(4)?;
                Ok(ScreenerRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    conditions: json_column(2, &conditions)?,
                    preset_key: row.get(3)?,
                    result_count: count.max(0) as usize,
                    result_symbols: json_column(5, &symbols)?,
                    summary: json_column::<ScreenSummary>(6, &summary)?,
                    results: Vec::new(),
                    created_at: timestamp_column(7, &created_at)?,
                })
            })
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn get_screener_record(&self, id: i64) -> Result<Option<ScreenerRecord>, StockpickError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, conditions, preset_key, result_count, result_symbols,
                    result_summary, created_at, result_data
             FROM screener_records WHERE id = ?1",
            params![id],
            |row| {
                let conditions: String = row.get(2)?;
                let symbols: String = row.get(5)?;
                let summary: String = row.get(6)?;
                let created_at: String = row.get(7)?;
                let data: String = row.get(8)?;
                let count: i64 = row.get(4)?;
                Ok(ScreenerRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    conditions: json_column(2, &conditions)?,
                    preset_key: row.get(3)?,
                    result_count: count.max(0) as usize,
                    result_symbols: json_column(5, &symbols)?,
                    summary: json_column(6, &summary)?,
                    results: json_column(8, &data)?,
                    created_at: timestamp_column(7, &created_at)?,
                })
            },
        )
        .optional()
        .map_err(query_error)
    }

    fn delete_screener_record(&self, id: i64) -> Result<bool, StockpickError> {
        let conn = self.conn()?;
        let affected = conn
            .execute("DELETE FROM screener_records WHERE id = ?1", params![id])
            .map_err(query_error)?;
        Ok(affected > 0)
    }

    fn get_config_value(&self, key: &str) -> Result<Option<String>, StockpickError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM system_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(query_error)
    }

    fn set_config_value(&self, key: &str, value: &str) -> Result<(), StockpickError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO system_config (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_text()],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn config_values(&self, prefix: &str) -> Result<Vec<(String, String)>, StockpickError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM system_config WHERE substr(key, 1, ?2) = ?1 ORDER BY key")
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![prefix, prefix.len() as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn list_watch_groups(&self) -> Result<Vec<WatchGroup>, StockpickError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WATCH_GROUP_COLUMNS} FROM watchlist_groups g ORDER BY g.sort_order, g.id"
            ))
            .map_err(query_error)?;
        let rows = stmt.query_map([], watch_group_row).map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn add_watch_group(&self, name: &str) -> Result<WatchGroup, StockpickError> {
        let name = validate_group_name(name)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO watchlist_groups (name, sort_order, created_at)
             VALUES (?1, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM watchlist_groups), ?2)",
            params![name, now_text()],
        )
        .map_err(query_error)?;
        let id = conn.last_insert_rowid();
        Self::watch_group(&conn, id)?.ok_or_else(|| StockpickError::DatabaseQuery {
            reason: format!("watchlist group {id} vanished after insert"),
        })
    }

    fn rename_watch_group(&self, id: i64, name: &str) -> Result<bool, StockpickError> {
        let name = validate_group_name(name)?;
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "UPDATE watchlist_groups SET name = ?1 WHERE id = ?2",
                params![name, id],
            )
            .map_err(query_error)?;
        Ok(affected > 0)
    }

    fn delete_watch_group(&self, id: i64) -> Result<bool, StockpickError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let Some(group) = Self::watch_group(&tx, id)? else {
            return Ok(false);
        };
        group.check_deletable()?;
        tx.execute("DELETE FROM watchlist_stocks WHERE group_id = ?1", params![id])
            .map_err(query_error)?;
        tx.execute("DELETE FROM watchlist_groups WHERE id = ?1", params![id])
            .map_err(query_error)?;
        tx.commit().map_err(query_error)?;
        debug!(group = id, stocks = group.stock_count, "watchlist group deleted");
        Ok(true)
    }

    fn list_watch_stocks(&self, group_id: i64) -> Result<Vec<WatchStock>, StockpickError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {WATCH_STOCK_COLUMNS} FROM watchlist_stocks
                 WHERE group_id = ?1 ORDER BY added_at DESC, id DESC"
            ))
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![group_id], watch_stock_row)
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }

    fn add_watch_stock(&self, stock: &NewWatchStock) -> Result<WatchStock, StockpickError> {
        let conn = self.conn()?;
        if Self::watch_group(&conn, stock.group_id)?.is_none() {
            return Err(StockpickError::Watchlist {
                reason: format!("no watchlist group with id {}", stock.group_id),
            });
        }
        let inserted = conn.execute(
            "INSERT INTO watchlist_stocks (group_id, symbol, stock_name, market, note, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stock.group_id,
                stock.symbol,
                stock.stock_name,
                market_text(stock.market)?,
                stock.note,
                now_text()
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(stock.duplicate_error()),
            Err(e) => return Err(query_error(e)),
        }
        let id = conn.last_insert_rowid();
        conn.query_row(
            &format!("SELECT {WATCH_STOCK_COLUMNS} FROM watchlist_stocks WHERE id = ?1"),
            params![id],
            watch_stock_row,
        )
        .map_err(query_error)
    }

    fn remove_watch_stock(&self, group_id: i64, symbol: &str) -> Result<bool, StockpickError> {
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "DELETE FROM watchlist_stocks WHERE group_id = ?1 AND symbol = ?2",
                params![group_id, symbol],
            )
            .map_err(query_error)?;
        Ok(affected > 0)
    }
}

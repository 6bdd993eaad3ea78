//! CSV file data adapter.
//!
//! Daily bars live in `<dir>/<symbol>.csv` with a
//! `date,open,high,low,close,volume` header. The candidate pool is a
//! separate CSV with `symbol,name` and optional auction, market cap and
//! concept columns.

use crate::domain::error::StockpickError;
use crate::domain::market::exchange_symbol;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::pick::Candidate;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
    pool_path: Option<PathBuf>,
}

fn parse_error(reason: String) -> StockpickError {
    StockpickError::Database { reason }
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str) -> Result<&'r str, StockpickError> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| parse_error(format!("missing {name} column")))
}

fn number(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, StockpickError> {
    field(record, index, name)?
        .parse()
        .map_err(|e| parse_error(format!("invalid {name} value: {e}")))
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            pool_path: None,
        }
    }

    pub fn with_pool(mut self, pool_path: PathBuf) -> Self {
        self.pool_path = Some(pool_path);
        self
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    fn read_bars(&self, symbol: &str) -> Result<Vec<OhlcvBar>, StockpickError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StockpickError::NoData {
                code: symbol.to_string(),
            },
            _ => parse_error(format!("failed to read {}: {e}", path.display())),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| parse_error(format!("CSV parse error: {e}")))?;
            let date = NaiveDate::parse_from_str(field(&record, 0, "date")?, "%Y-%m-%d")
                .map_err(|e| parse_error(format!("invalid date format: {e}")))?;
            bars.push(OhlcvBar {
                code: symbol.to_string(),
                date,
                open: number(&record, 1, "open")?,
                high: number(&record, 2, "high")?,
                low: number(&record, 3, "low")?,
                close: number(&record, 4, "close")?,
                volume: number(&record, 5, "volume")?,
            });
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    /// Symbols with a bars CSV, sorted.
    fn bar_symbols(&self) -> Result<Vec<String>, StockpickError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            parse_error(format!(
                "failed to read directory {}: {e}",
                self.base_path.display()
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| parse_error(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            if let Some(symbol) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(&self, symbol: &str, days: usize) -> Result<Vec<OhlcvBar>, StockpickError> {
        let mut bars = self.read_bars(symbol)?;
        if bars.is_empty() {
            return Err(StockpickError::NoData {
                code: symbol.to_string(),
            });
        }
        if bars.len() > days {
            bars.drain(..bars.len() - days);
        }
        debug!(symbol, bars = bars.len(), "loaded bars");
        Ok(bars)
    }

    /// Pool CSV when configured; otherwise every symbol with bar data,
    /// named after itself.
    fn candidate_pool(&self) -> Result<Vec<Candidate>, StockpickError> {
        let Some(path) = &self.pool_path else {
            return Ok(self
                .bar_symbols()?
                .into_iter()
                .map(|s| Candidate::new(s.clone(), s))
                .collect());
        };
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| parse_error(format!("failed to read {}: {e}", path.display())))?;
        let mut pool = Vec::new();
        for row in rdr.deserialize::<Candidate>() {
            let mut candidate =
                row.map_err(|e| parse_error(format!("candidate pool parse error: {e}")))?;
            candidate.symbol = exchange_symbol(&candidate.symbol);
            pool.push(candidate);
        }
        Ok(pool)
    }
}

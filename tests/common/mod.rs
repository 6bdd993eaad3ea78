#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use stockpick::domain::error::StockpickError;
use stockpick::domain::llm::{ChatRequest, NewProvider, Provider, ProviderRegistry};
pub use stockpick::domain::ohlcv::OhlcvBar;
use stockpick::domain::pick::Candidate;
use stockpick::ports::chat_port::ChatPort;
use stockpick::ports::data_port::DataPort;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub pool: Vec<Candidate>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            pool: Vec::new(),
        }
    }

    /// Adds bars and a pool entry for `symbol`.
    pub fn with_stock(mut self, symbol: &str, name: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self.pool.push(Candidate::new(symbol, name));
        self
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.pool.push(candidate);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, symbol: &str, days: usize) -> Result<Vec<OhlcvBar>, StockpickError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(StockpickError::Database {
                reason: reason.clone(),
            });
        }
        let bars = self
            .data
            .get(symbol)
            .ok_or_else(|| StockpickError::NoData {
                code: symbol.to_string(),
            })?;
        let skip = bars.len().saturating_sub(days);
        Ok(bars[skip..].to_vec())
    }

    fn candidate_pool(&self) -> Result<Vec<Candidate>, StockpickError> {
        Ok(self.pool.clone())
    }
}

/// Replies with a canned answer and records every prompt it receives.
pub struct MockChat {
    pub reply: Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            reply: Err(reason.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl ChatPort for MockChat {
    fn complete(&self, _provider: &Provider, request: &ChatRequest) -> Result<String, StockpickError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        self.reply.clone().map_err(|reason| StockpickError::Llm { reason })
    }
}

pub fn registry_with_provider() -> ProviderRegistry {
    let mut registry = ProviderRegistry::default();
    registry
        .add(NewProvider {
            id: Some("deepseek".into()),
            name: "DeepSeek".into(),
            base_url: "https://api.deepseek.com/v1".into(),
            model_id: "deepseek-chat".into(),
            api_key: "sk-test-key".into(),
            enabled: true,
        })
        .unwrap();
    registry
}

/// Daily bars with open == close at the given prices, volume 1000.
pub fn make_bars(symbol: &str, prices: &[f64]) -> Vec<OhlcvBar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    prices
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            code: symbol.to_string(),
            date: start + Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Twelve bars climbing 0.3 per day from `start`.
pub fn rising(symbol: &str, start: f64) -> Vec<OhlcvBar> {
    let prices: Vec<f64> = (0..12).map(|i| start + i as f64 * 0.3).collect();
    make_bars(symbol, &prices)
}

/// Twelve bars falling 0.4 per day from `start`.
pub fn falling(symbol: &str, start: f64) -> Vec<OhlcvBar> {
    let prices: Vec<f64> = (0..12).map(|i| start - i as f64 * 0.4).collect();
    make_bars(symbol, &prices)
}

pub fn bars_csv(bars: &[OhlcvBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    out
}

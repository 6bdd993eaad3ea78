//! Recommendation strategy parameters.

use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key prefix for strategy rows in the key/value config store.
pub const KV_PREFIX: &str = "strategy_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub tech_weight: f64,
    pub auction_weight: f64,
    pub score_threshold: f64,
    pub max_recommendations: usize,
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            tech_weight: 0.65,
            auction_weight: 0.35,
            score_threshold: 0.65,
            max_recommendations: 15,
            min_price: 2.0,
            max_price: 300.0,
        }
    }
}

impl StrategyConfig {
    /// Read `[strategy]`, falling back to defaults per key.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            tech_weight: config.get_double("strategy", "tech_weight", d.tech_weight),
            auction_weight: config.get_double("strategy", "auction_weight", d.auction_weight),
            score_threshold: config.get_double("strategy", "score_threshold", d.score_threshold),
            max_recommendations: config
                .get_int("strategy", "max_recommendations", d.max_recommendations as i64)
                .max(0) as usize,
            min_price: config.get_double("strategy", "min_price", d.min_price),
            max_price: config.get_double("strategy", "max_price", d.max_price),
        }
    }

    /// Overlay `strategy_*` key/value rows onto `self`. Unknown keys and
    /// unparseable values are skipped.
    pub fn apply_kv<'a, I>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in rows {
            let Some(name) = key.strip_prefix(KV_PREFIX) else {
                continue;
            };
            let float = || value.trim().parse::<f64>().ok();
            let parsed = match name {
                "tech_weight" => float().map(|v| self.tech_weight = v).is_some(),
                "auction_weight" => float().map(|v| self.auction_weight = v).is_some(),
                "score_threshold" => float().map(|v| self.score_threshold = v).is_some(),
                "min_price" => float().map(|v| self.min_price = v).is_some(),
                "max_price" => float().map(|v| self.max_price = v).is_some(),
                "max_recommendations" => value
                    .trim()
                    .parse::<usize>()
                    .map(|v| self.max_recommendations = v)
                    .is_ok(),
                _ => continue,
            };
            if !parsed {
                warn!(key, value, "ignoring unparseable strategy value");
            }
        }
        self
    }

    /// Rows for the key/value config store.
    pub fn to_kv(&self) -> Vec<(String, String)> {
        vec![
            (format!("{KV_PREFIX}tech_weight"), self.tech_weight.to_string()),
            (format!("{KV_PREFIX}auction_weight"), self.auction_weight.to_string()),
            (format!("{KV_PREFIX}score_threshold"), self.score_threshold.to_string()),
            (
                format!("{KV_PREFIX}max_recommendations"),
                self.max_recommendations.to_string(),
            ),
            (format!("{KV_PREFIX}min_price"), self.min_price.to_string()),
            (format!("{KV_PREFIX}max_price"), self.max_price.to_string()),
        ]
    }

    pub fn price_in_band(&self, price: f64) -> bool {
        (self.min_price..=self.max_price).contains(&price)
    }
}

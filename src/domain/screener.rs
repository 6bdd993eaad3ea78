//! Condition-based screening over scored picks.
//!
//! Every condition is optional and all present conditions must hold.
//! Results are ordered by total score, highest first.

use crate::domain::error::StockpickError;
use crate::domain::market::Board;
use crate::domain::pick::{Confidence, StockPick, round2};
use crate::domain::scoring::GapType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_score_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_score_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_score_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_score_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_score_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_ratio_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_ratio_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsi_max: Option<f64>,
    /// Billions of CNY, like `StockPick::market_cap_billion`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_max: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gap_types: Vec<GapType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub confidence_levels: Vec<Confidence>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boards: Vec<Board>,
    /// Substring of the symbol or the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|m| value >= m) && max.is_none_or(|m| value <= m)
}

impl ScreenConditions {
    pub fn matches(&self, stock: &StockPick) -> bool {
        if !within(stock.current_price, self.price_min, self.price_max)
            || !within(stock.total_score, self.total_score_min, self.total_score_max)
            || !within(stock.tech_score, self.tech_score_min, self.tech_score_max)
            || !within(stock.auction_score, self.auction_score_min, self.auction_score_max)
            || !within(stock.auction_ratio, self.auction_ratio_min, self.auction_ratio_max)
            || !within(stock.rsi, self.rsi_min, self.rsi_max)
            || !within(stock.market_cap_billion, self.market_cap_min, self.market_cap_max)
        {
            return false;
        }
        if !self.gap_types.is_empty() && !self.gap_types.contains(&stock.gap_type) {
            return false;
        }
        if !self.confidence_levels.is_empty() && !self.confidence_levels.contains(&stock.confidence) {
            return false;
        }
        if !self.boards.is_empty() && !self.boards.contains(&stock.board) {
            return false;
        }
        match self.keyword.as_deref().map(str::trim) {
            Some(k) if !k.is_empty() => stock.symbol.contains(k) || stock.name.contains(k),
            _ => true,
        }
    }
}

pub fn screen(stocks: &[StockPick], conditions: &ScreenConditions) -> Vec<StockPick> {
    let mut results: Vec<StockPick> = stocks
        .iter()
        .filter(|s| conditions.matches(s))
        .cloned()
        .collect();
    results.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    results
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub conditions: ScreenConditions,
}

pub fn presets() -> Vec<Preset> {
    vec![
        Preset {
            key: "low_price_breakout",
            name: "Low-price breakout",
            description: "Under 10, gapping up in the auction with decent technicals",
            conditions: ScreenConditions {
                price_min: Some(2.0),
                price_max: Some(10.0),
                auction_ratio_min: Some(0.5),
                tech_score_min: Some(0.55),
                confidence_levels: vec![Confidence::VeryHigh, Confidence::High],
                ..ScreenConditions::default()
            },
        },
        Preset {
            key: "strong_momentum",
            name: "Strong momentum",
            description: "Total score at least 0.8, very high confidence, gap-up auction",
            conditions: ScreenConditions {
                total_score_min: Some(0.8),
                auction_ratio_min: Some(1.0),
                gap_types: vec![GapType::GapUp],
                confidence_levels: vec![Confidence::VeryHigh],
                ..ScreenConditions::default()
            },
        },
        Preset {
            key: "value_pick",
            name: "Value pick",
            description: "Mid-priced with steady technicals and total score at least 0.7",
            conditions: ScreenConditions {
                price_min: Some(10.0),
                price_max: Some(100.0),
                total_score_min: Some(0.7),
                tech_score_min: Some(0.6),
                ..ScreenConditions::default()
            },
        },
        Preset {
            key: "oversold_rebound",
            name: "Oversold rebound",
            description: "Low RSI showing signs of stabilising, flat or slightly higher auction",
            conditions: ScreenConditions {
                rsi_max: Some(55.0),
                auction_ratio_min: Some(-0.5),
                auction_ratio_max: Some(1.5),
                total_score_min: Some(0.5),
                ..ScreenConditions::default()
            },
        },
        Preset {
            key: "small_cap_growth",
            name: "Small-cap growth",
            description: "Market cap under 20 billion CNY on ChiNext or the SME board",
            conditions: ScreenConditions {
                market_cap_max: Some(20.0),
                boards: vec![Board::ChiNext, Board::Sme],
                total_score_min: Some(0.6),
                ..ScreenConditions::default()
            },
        },
    ]
}

pub fn preset(key: &str) -> Result<Preset, StockpickError> {
    presets()
        .into_iter()
        .find(|p| p.key == key)
        .ok_or_else(|| StockpickError::UnknownPreset(key.to_string()))
}

pub fn screen_with_preset(stocks: &[StockPick], key: &str) -> Result<Vec<StockPick>, StockpickError> {
    let preset = preset(key)?;
    Ok(screen(stocks, &preset.conditions))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopStock {
    pub symbol: String,
    pub name: String,
    pub total_score: f64,
    pub current_price: f64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenSummary {
    pub count: usize,
    pub avg_score: f64,
    pub very_high_count: usize,
    pub boards: Vec<Board>,
    pub price_range: (f64, f64),
    pub top_stocks: Vec<TopStock>,
}

impl ScreenSummary {
    pub fn from_results(results: &[StockPick]) -> Self {
        if results.is_empty() {
            return Self::default();
        }
        let n = results.len() as f64;
        let avg = results.iter().map(|s| s.total_score).sum::<f64>() / n;
        let mut boards = Vec::new();
        for s in results {
            if !boards.contains(&s.board) {
                boards.push(s.board);
            }
        }
        let (min, max) = results.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
            (lo.min(s.current_price), hi.max(s.current_price))
        });

        let mut ranked: Vec<&StockPick> = results.iter().collect();
        ranked.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
        let top_stocks = ranked
            .into_iter()
            .take(5)
            .map(|s| TopStock {
                symbol: s.symbol.clone(),
                name: s.name.clone(),
                total_score: (s.total_score * 1000.0).round() / 1000.0,
                current_price: s.current_price,
                confidence: s.confidence,
            })
            .collect();

        Self {
            count: results.len(),
            avg_score: (avg * 1000.0).round() / 1000.0,
            very_high_count: results
                .iter()
                .filter(|s| s.confidence == Confidence::VeryHigh)
                .count(),
            boards,
            price_range: (round2(min), round2(max)),
            top_stocks,
        }
    }
}

/// A saved screening run. Listings leave `results` empty; fetching a
/// single record by id returns them in full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerRecord {
    pub id: i64,
    pub name: String,
    pub conditions: ScreenConditions,
    pub preset_key: Option<String>,
    pub result_count: usize,
    pub result_symbols: Vec<String>,
    pub summary: ScreenSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<StockPick>,
    pub created_at: NaiveDateTime,
}

/// Record contents before the store assigns an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScreenerRecord {
    pub name: String,
    pub conditions: ScreenConditions,
    pub preset_key: Option<String>,
    pub results: Vec<StockPick>,
}

impl NewScreenerRecord {
    pub fn summary(&self) -> ScreenSummary {
        ScreenSummary::from_results(&self.results)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.results.iter().map(|s| s.symbol.clone()).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::pick;
    use super::*;

    fn universe() -> Vec<StockPick> {
        vec![
            pick("sh.600036", "招商银行", 35.0, 0.72, 0.8),
            pick("sz.300750", "宁德时代", 180.0, 0.86, 2.5),
            pick("sz.002475", "立讯精密", 8.5, 0.81, 1.2),
            pick("sz.000001", "平安银行", 9.8, 0.55, -0.2),
        ]
    }

    #[test]
    fn empty_conditions_keep_everything_sorted() {
        let out = screen(&universe(), &ScreenConditions::default());
        let scores: Vec<f64> = out.iter().map(|s| s.total_score).collect();
        assert_eq!(scores, vec![0.86, 0.81, 0.72, 0.55]);
    }

    #[test]
    fn numeric_bounds_are_inclusive() {
        let c = ScreenConditions {
            price_min: Some(9.8),
            price_max: Some(35.0),
            ..ScreenConditions::default()
        };
        let out: Vec<String> = screen(&universe(), &c).into_iter().map(|s| s.symbol).collect();
        assert_eq!(out, vec!["sh.600036", "sz.000001"]);
    }

    #[test]
    fn list_and_keyword_conditions() {
        let c = ScreenConditions {
            boards: vec![Board::ChiNext, Board::Sme],
            ..ScreenConditions::default()
        };
        assert_eq!(screen(&universe(), &c).len(), 2);

        let c = ScreenConditions {
            keyword: Some(" 银行 ".into()),
            ..ScreenConditions::default()
        };
        assert_eq!(screen(&universe(), &c).len(), 2);

        let c = ScreenConditions {
            keyword: Some("600036".into()),
            gap_types: vec![GapType::Flat],
            ..ScreenConditions::default()
        };
        assert!(screen(&universe(), &c).is_empty());
    }

    #[test]
    fn presets_apply() {
        let out = screen_with_preset(&universe(), "low_price_breakout").unwrap();
        let symbols: Vec<&str> = out.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["sz.002475"]);

        // Every stock in the universe is a 150 billion large cap.
        assert!(screen_with_preset(&universe(), "small_cap_growth").unwrap().is_empty());

        assert_eq!(presets().len(), 5);
        assert!(matches!(
            screen_with_preset(&universe(), "moonshot"),
            Err(StockpickError::UnknownPreset(k)) if k == "moonshot"
        ));
    }

    #[test]
    fn small_cap_growth_bounds_cap_in_billions() {
        let sized = |symbol: &str, cap: f64| StockPick {
            market_cap_billion: cap,
            ..pick(symbol, "", 10.0, 0.7, 1.0)
        };
        let stocks = vec![
            sized("sz.300001", 15.0),
            sized("sz.300002", 20.0),
            sized("sz.300003", 150.0),
            sized("sz.002001", 8.0),
            sized("sh.600001", 8.0),
        ];
        let out = screen_with_preset(&stocks, "small_cap_growth").unwrap();
        let mut symbols: Vec<&str> = out.iter().map(|s| s.symbol.as_str()).collect();
        symbols.sort();
        assert_eq!(symbols, vec!["sz.002001", "sz.300001", "sz.300002"]);
    }

    #[test]
    fn conditions_deserialize_from_partial_json() {
        let c: ScreenConditions =
            serde_json::from_str(r#"{"price_max": 10, "gap_types": ["gap_up"]}"#).unwrap();
        assert_eq!(c.price_max, Some(10.0));
        assert_eq!(c.gap_types, vec![GapType::GapUp]);
        assert!(c.rsi_min.is_none());
    }

    #[test]
    fn summary_of_results() {
        let results = screen(&universe(), &ScreenConditions::default());
        let summary = ScreenSummary::from_results(&results);
        assert_eq!(summary.count, 4);
        assert!((summary.avg_score - 0.735).abs() < 1e-9);
        assert_eq!(summary.very_high_count, 2);
        assert_eq!(summary.price_range, (8.5, 180.0));
        assert_eq!(summary.top_stocks[0].symbol, "sz.300750");
        assert_eq!(summary.boards.len(), 4);

        assert_eq!(ScreenSummary::from_results(&[]), ScreenSummary::default());
    }
}

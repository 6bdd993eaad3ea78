//! Pluggable analysis rules.
//!
//! A rule scores one aspect of a stock on a 0-100 scale from a
//! [`RuleContext`]. The engine combines rule scores by weight; rules with
//! zero weight are informational only.

use crate::domain::error::StockpickError;
use crate::domain::market::Market;
use crate::domain::technical::TechnicalSnapshot;
use serde::{Deserialize, Serialize};

/// Financial indicators for one company. Missing values are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub roe: Option<f64>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub debt_ratio: Option<f64>,
    pub gross_margin: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub profit_growth: Option<f64>,
    pub market_cap_billion: Option<f64>,
    /// Number of financial indicators the data source returned.
    pub indicator_count: usize,
    pub has_valuation: bool,
    pub has_forecast: bool,
    pub industry: String,
}

/// News sentiment aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// Overall polarity in [-1, 1].
    pub overall: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub total_analyzed: u32,
    pub trend: String,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            overall: 0.0,
            confidence: 0.0,
            total_analyzed: 0,
            trend: "neutral".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleContext {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub technical: TechnicalSnapshot,
    pub fundamentals: Fundamentals,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub score: f64,
    pub details: String,
}

impl RuleOutcome {
    /// Build an outcome with the score clamped to [0, 100].
    pub fn clamped(score: f64, details: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 100.0),
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub weight: f64,
}

pub trait AnalysisRule: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Default weight in the comprehensive score.
    fn weight(&self) -> f64 {
        1.0
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError>;

    fn info(&self) -> RuleInfo {
        RuleInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
            weight: self.weight(),
        }
    }
}

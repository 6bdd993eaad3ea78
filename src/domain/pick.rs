//! Candidate pool entries and the stock picks produced from them.

use crate::domain::explain::Explanation;
use crate::domain::market::{Board, bare_code};
use crate::domain::scoring::{AuctionStrength, GapType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of the candidate pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub name: String,
    /// Call-auction change versus previous close, in percent.
    #[serde(default)]
    pub auction_ratio: Option<f64>,
    #[serde(default)]
    pub auction_volume_ratio: Option<f64>,
    /// Billions of CNY; 100亿 is 10.0.
    #[serde(default)]
    pub market_cap_billion: Option<f64>,
    #[serde(default)]
    pub concept: Option<String>,
}

impl Candidate {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            auction_ratio: None,
            auction_volume_ratio: None,
            market_cap_billion: None,
            concept: None,
        }
    }

    /// Concept tag, or a generic one derived from the code prefix.
    pub fn concept_tag(&self) -> String {
        if let Some(tag) = self.concept.as_deref().filter(|t| !t.trim().is_empty()) {
            return tag.to_string();
        }
        let code = bare_code(&self.symbol);
        let tag = if code.starts_with('6') {
            "main-board blue chip"
        } else if code.starts_with("002") {
            "SME"
        } else if code.starts_with("00") {
            "traditional industry"
        } else if code.starts_with("30") {
            "growth"
        } else {
            "value"
        };
        tag.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryHigh,
    High,
    Medium,
}

impl Confidence {
    pub fn from_score(total_score: f64) -> Confidence {
        if total_score >= 0.8 {
            Confidence::VeryHigh
        } else if total_score >= 0.65 {
            Confidence::High
        } else {
            Confidence::Medium
        }
    }

    /// (stop-loss, target) multipliers on the current price.
    pub fn price_multipliers(&self) -> (f64, f64) {
        match self {
            Confidence::VeryHigh => (0.94, 1.12),
            Confidence::High => (0.95, 1.08),
            Confidence::Medium => (0.96, 1.06),
        }
    }

    pub fn parse(s: &str) -> Option<Confidence> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "very_high" => Some(Confidence::VeryHigh),
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::VeryHigh => "very_high",
            Confidence::High => "high",
            Confidence::Medium => "medium",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPick {
    pub symbol: String,
    pub name: String,
    pub board: Board,
    pub current_price: f64,
    pub total_score: f64,
    pub tech_score: f64,
    pub auction_score: f64,
    pub auction_ratio: f64,
    pub gap_type: GapType,
    pub auction_strength: AuctionStrength,
    pub confidence: Confidence,
    pub strategy: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub rsi: f64,
    pub volume_ratio: f64,
    pub market_cap_billion: f64,
    pub breakout_signal: bool,
    pub volume_surge: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<Explanation>,
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Inputs to [`StockPick::build`] gathered by the pipeline.
#[derive(Debug, Clone)]
pub struct PickInputs<'a> {
    pub candidate: &'a Candidate,
    pub current_price: f64,
    pub tech_score: f64,
    pub auction_ratio: f64,
    pub auction_strength: AuctionStrength,
    pub total_score: f64,
    pub rsi: f64,
    pub volume_ratio: f64,
}

impl StockPick {
    pub fn build(inputs: PickInputs<'_>) -> StockPick {
        let PickInputs {
            candidate,
            current_price: price,
            tech_score,
            auction_ratio,
            auction_strength,
            total_score,
            rsi,
            volume_ratio,
        } = inputs;

        let confidence = Confidence::from_score(total_score);
        let gap_type = GapType::from_ratio(auction_ratio);
        let auction_score = auction_strength.strength();
        let concept = candidate.concept_tag();

        let strategy = if gap_type == GapType::GapUp && auction_score > 0.7 {
            if price <= 10.0 {
                "low-priced gap-up with good technicals, short-term opportunity".to_string()
            } else {
                format!("mild gap-up with technical support, {concept}, worth watching")
            }
        } else if gap_type == GapType::Flat && total_score > 0.7 {
            format!("flat open firming up with good indicators, {concept}, consider a position")
        } else {
            format!("acceptable technicals, {concept}, watch cautiously")
        };

        let (stop_mult, target_mult) = confidence.price_multipliers();

        StockPick {
            symbol: candidate.symbol.clone(),
            name: candidate.name.clone(),
            board: Board::classify(&candidate.symbol),
            current_price: price,
            total_score: (total_score * 1000.0).round() / 1000.0,
            tech_score: (tech_score * 1000.0).round() / 1000.0,
            auction_score,
            auction_ratio: round2(auction_ratio),
            gap_type,
            auction_strength,
            confidence,
            strategy,
            entry_price: round2(price * 1.01),
            stop_loss: round2(price * stop_mult),
            target_price: round2(price * target_mult),
            rsi,
            volume_ratio,
            market_cap_billion: candidate.market_cap_billion.unwrap_or(0.0),
            breakout_signal: auction_score > 0.7,
            volume_surge: volume_ratio > 1.5,
            explanation: None,
        }
    }
}

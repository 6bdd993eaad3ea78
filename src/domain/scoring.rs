//! Composite scoring for deep analysis, plus the auction (pre-open call
//! auction) and capital-flow classifications it relies on.
//!
//! Every component score starts at 0.5 and is capped at 1.0.

use crate::domain::rule::Fundamentals;
use crate::domain::technical::{MacdSignal, MaTrend, TechnicalSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const TECH_WEIGHT: f64 = 0.40;
pub const FUNDAMENTAL_WEIGHT: f64 = 0.35;
pub const SENTIMENT_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    GapUp,
    Flat,
    GapDown,
}

impl GapType {
    /// Classify the opening gap from the auction change in percent.
    pub fn from_ratio(ratio: f64) -> GapType {
        if ratio >= 0.5 {
            GapType::GapUp
        } else if ratio >= -0.5 {
            GapType::Flat
        } else {
            GapType::GapDown
        }
    }

    pub fn parse(s: &str) -> Option<GapType> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "gap_up" | "up" => Some(GapType::GapUp),
            "flat" => Some(GapType::Flat),
            "gap_down" | "down" => Some(GapType::GapDown),
            _ => None,
        }
    }
}

impl fmt::Display for GapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GapType::GapUp => "gap_up",
            GapType::Flat => "flat",
            GapType::GapDown => "gap_down",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStrength {
    Strong,
    FairlyStrong,
    Average,
    Weak,
}

impl AuctionStrength {
    pub fn evaluate(ratio: f64, volume_ratio: f64) -> AuctionStrength {
        if ratio > 2.0 && volume_ratio > 1.5 {
            AuctionStrength::Strong
        } else if ratio > 1.0 && volume_ratio > 1.2 {
            AuctionStrength::FairlyStrong
        } else if ratio > -1.0 && volume_ratio > 0.8 {
            AuctionStrength::Average
        } else {
            AuctionStrength::Weak
        }
    }

    /// Numeric strength in [0, 1], used as the auction score.
    pub fn strength(&self) -> f64 {
        match self {
            AuctionStrength::Strong => 0.85,
            AuctionStrength::FairlyStrong => 0.7,
            AuctionStrength::Average => 0.55,
            AuctionStrength::Weak => 0.4,
        }
    }
}

impl fmt::Display for AuctionStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuctionStrength::Strong => "strong",
            AuctionStrength::FairlyStrong => "fairly strong",
            AuctionStrength::Average => "average",
            AuctionStrength::Weak => "weak",
        };
        f.write_str(s)
    }
}

/// Call-auction snapshot: change versus previous close in percent and
/// auction volume relative to normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuctionData {
    pub ratio: f64,
    pub volume_ratio: f64,
}

impl Default for AuctionData {
    fn default() -> Self {
        Self {
            ratio: 0.0,
            volume_ratio: 1.0,
        }
    }
}

impl AuctionData {
    pub fn gap_type(&self) -> GapType {
        GapType::from_ratio(self.ratio)
    }

    pub fn strength(&self) -> AuctionStrength {
        AuctionStrength::evaluate(self.ratio, self.volume_ratio)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowIntensity {
    VeryStrong,
    Strong,
    Medium,
    Weak,
    NoData,
}

impl FlowIntensity {
    pub fn classify(net_inflow: f64, total_amount: f64) -> FlowIntensity {
        if total_amount == 0.0 {
            return FlowIntensity::NoData;
        }
        let ratio = net_inflow.abs() / total_amount;
        if ratio > 0.15 {
            FlowIntensity::VeryStrong
        } else if ratio > 0.08 {
            FlowIntensity::Strong
        } else if ratio > 0.03 {
            FlowIntensity::Medium
        } else {
            FlowIntensity::Weak
        }
    }
}

/// Capital flow for one trading day. Ratios are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapitalFlow {
    pub net_inflow: f64,
    pub total_amount: f64,
    pub main_control_ratio: f64,
}

impl Default for CapitalFlow {
    fn default() -> Self {
        Self {
            net_inflow: 0.0,
            total_amount: 0.0,
            main_control_ratio: 50.0,
        }
    }
}

impl CapitalFlow {
    /// Net inflow as a percentage of turnover.
    pub fn inflow_ratio(&self) -> f64 {
        if self.total_amount > 0.0 {
            self.net_inflow / self.total_amount * 100.0
        } else {
            0.0
        }
    }

    pub fn intensity(&self) -> FlowIntensity {
        FlowIntensity::classify(self.net_inflow, self.total_amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeScores {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
    pub total: f64,
}

impl CompositeScores {
    pub fn compute(
        tech: &TechnicalSnapshot,
        fundamentals: &Fundamentals,
        flow: &CapitalFlow,
        auction: &AuctionData,
    ) -> Self {
        let technical = technical_score(tech);
        let fundamental = fundamental_score(fundamentals);
        let sentiment = sentiment_score(flow, auction);
        let total = technical * TECH_WEIGHT
            + fundamental * FUNDAMENTAL_WEIGHT
            + sentiment * SENTIMENT_WEIGHT;
        Self {
            technical: round3(technical),
            fundamental: round3(fundamental),
            sentiment: round3(sentiment),
            total: round3(total),
        }
    }
}

pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub fn technical_score(tech: &TechnicalSnapshot) -> f64 {
    let mut score: f64 = 0.5;

    if (30.0..=70.0).contains(&tech.rsi) {
        score += 0.15;
    } else if (20.0..=80.0).contains(&tech.rsi) {
        score += 0.1;
    }

    // Line above signal, whether it just crossed or is holding.
    score += if tech.macd_signal == MacdSignal::Insufficient {
        0.1
    } else if tech.macd_histogram > 0.0 {
        0.2
    } else {
        0.0
    };

    score += match tech.ma_alignment() {
        MaTrend::BullishAlignment => 0.15,
        MaTrend::ShortTermUp => 0.1,
        _ => 0.0,
    };

    if (0.2..=0.8).contains(&tech.bb_position) {
        score += 0.1;
    }

    let change = tech.price_change;
    if change > 0.0 && change <= 5.0 {
        score += 0.1;
    } else if (-2.0..=0.0).contains(&change) {
        score += 0.05;
    }

    score.min(1.0)
}

pub fn fundamental_score(fund: &Fundamentals) -> f64 {
    let mut score: f64 = 0.5;

    if let Some(pe) = fund.pe {
        if (10.0..=25.0).contains(&pe) {
            score += 0.15;
        } else if (8.0..=35.0).contains(&pe) {
            score += 0.1;
        }
    }

    if let Some(roe) = fund.roe {
        if roe >= 15.0 {
            score += 0.15;
        } else if roe >= 10.0 {
            score += 0.1;
        }
    }

    if let (Some(revenue), Some(profit)) = (fund.revenue_growth, fund.profit_growth) {
        if revenue > 10.0 && profit > 15.0 {
            score += 0.2;
        } else if revenue > 5.0 && profit > 10.0 {
            score += 0.15;
        } else if revenue > 0.0 && profit > 0.0 {
            score += 0.1;
        }
    }

    if let Some(debt) = fund.debt_ratio {
        if debt <= 40.0 {
            score += 0.1;
        } else if debt <= 60.0 {
            score += 0.05;
        }
    }

    score.min(1.0)
}

pub fn sentiment_score(flow: &CapitalFlow, auction: &AuctionData) -> f64 {
    let mut score: f64 = 0.5;

    let inflow = flow.inflow_ratio();
    if inflow > 5.0 {
        score += 0.2;
    } else if inflow > 2.0 {
        score += 0.15;
    } else if inflow > 0.0 {
        score += 0.1;
    }

    if flow.main_control_ratio >= 60.0 {
        score += 0.15;
    } else if flow.main_control_ratio >= 45.0 {
        score += 0.1;
    }

    if auction.ratio > 1.0 {
        score += 0.15;
    } else if auction.ratio > 0.0 {
        score += 0.1;
    } else if auction.ratio > -1.0 {
        score += 0.05;
    }

    score.min(1.0)
}

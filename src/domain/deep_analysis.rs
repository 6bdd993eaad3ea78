//! Deep single-stock analysis: composite scores plus a model-written
//! report parsed into structured advice.

use crate::domain::llm::{Caller, ChatRequest, LlmClient};
use crate::domain::pick::round2;
use crate::domain::rule::Fundamentals;
use crate::domain::scoring::{AuctionData, CapitalFlow, CompositeScores};
use crate::domain::technical::TechnicalSnapshot;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use tracing::{info, warn};

pub const SYSTEM_PROMPT: &str =
    "You are a senior equity analyst. Give professional, objective investment analysis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    StrongBuy,
    Buy,
    Neutral,
    Cautious,
}

impl Rating {
    pub fn confidence(&self) -> &'static str {
        match self {
            Rating::StrongBuy => "very_high",
            Rating::Buy => "high",
            Rating::Neutral => "medium",
            Rating::Cautious => "low",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rating::StrongBuy => "Strong Buy",
            Rating::Buy => "Buy",
            Rating::Neutral => "Neutral",
            Rating::Cautious => "Cautious",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low risk",
            RiskLevel::Medium => "medium risk",
            RiskLevel::High => "high risk",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub text: String,
    pub rating: Rating,
    pub risk: RiskLevel,
    pub target_price: f64,
    pub stop_loss_price: f64,
    pub expected_return_pct: f64,
    pub holding_period_days: u32,
    pub position_pct: f64,
    pub buy_point: String,
    pub sell_point: String,
    /// No model reply was available.
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub struct DeepAnalysisInput {
    pub code: String,
    pub name: String,
    pub technical: TechnicalSnapshot,
    pub fundamentals: Fundamentals,
    pub flow: CapitalFlow,
    pub auction: AuctionData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepAnalysisReport {
    pub code: String,
    pub name: String,
    pub analyzed_at: NaiveDateTime,
    pub technical: TechnicalSnapshot,
    pub fundamentals: Fundamentals,
    pub flow: CapitalFlow,
    pub auction: AuctionData,
    pub scores: CompositeScores,
    pub analysis: LlmAnalysis,
}

fn opt(value: Option<f64>, suffix: &str) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}{suffix}"))
}

pub fn build_prompt(input: &DeepAnalysisInput) -> String {
    let t = &input.technical;
    let f = &input.fundamentals;
    let mut p = String::new();
    let _ = writeln!(
        p,
        "Perform an in-depth investment analysis of {} ({}).",
        input.code, input.name
    );
    let _ = writeln!(p, "\n## Basics");
    let _ = writeln!(p, "- Code: {}", input.code);
    let _ = writeln!(p, "- Name: {}", input.name);
    if !f.industry.is_empty() {
        let _ = writeln!(p, "- Industry: {}", f.industry);
    }

    let _ = writeln!(p, "\n## Price");
    let _ = writeln!(p, "- Current price: {:.2}", t.current_price);
    let _ = writeln!(p, "- Change: {:+.2}%", t.price_change);

    let _ = writeln!(p, "\n## Technicals");
    let _ = writeln!(p, "- MA5: {:.2}", t.ma5);
    let _ = writeln!(p, "- MA10: {:.2}", t.ma10);
    let _ = writeln!(p, "- MA20: {:.2}", t.ma20);
    let _ = writeln!(p, "- RSI(14): {:.1}", t.rsi);
    let _ = writeln!(p, "- MACD signal: {}", t.macd_signal);
    let _ = writeln!(p, "- MA trend: {}", t.ma_trend);
    let _ = writeln!(p, "- Bollinger position: {:.2}", t.bb_position);
    let _ = writeln!(p, "- Volume: {} (ratio {:.2})", t.volume_status, t.volume_ratio);

    let _ = writeln!(p, "\n## Capital flow");
    let _ = writeln!(p, "- Net inflow: {:.0}", input.flow.net_inflow);
    let _ = writeln!(p, "- Inflow ratio: {:+.2}%", input.flow.inflow_ratio());
    let _ = writeln!(p, "- Main control ratio: {:.1}%", input.flow.main_control_ratio);

    let _ = writeln!(p, "\n## Call auction");
    let _ = writeln!(p, "- Auction change: {:+.2}%", input.auction.ratio);
    let _ = writeln!(p, "- Auction volume ratio: {:.2}", input.auction.volume_ratio);
    let _ = writeln!(p, "- Open type: {}", input.auction.gap_type());

    let _ = writeln!(p, "\n## Fundamentals");
    let _ = writeln!(p, "- PE: {}", opt(f.pe, ""));
    let _ = writeln!(p, "- PB: {}", opt(f.pb, ""));
    let _ = writeln!(p, "- ROE: {}", opt(f.roe, "%"));
    let _ = writeln!(p, "- Debt ratio: {}", opt(f.debt_ratio, "%"));
    let _ = writeln!(p, "- Revenue growth: {}", opt(f.revenue_growth, "%"));
    let _ = writeln!(p, "- Profit growth: {}", opt(f.profit_growth, "%"));
    let _ = writeln!(p, "- Market cap (billion): {}", opt(f.market_cap_billion, ""));

    p.push_str(
        "\nBased on the data above, answer with:\n\
         1. Rating: [Strong Buy/Buy/Neutral/Cautious/Avoid]\n\
         2. Confidence: [very high/high/medium/low/very low]\n\
         3. Risk: [low risk/medium-low risk/medium risk/medium-high risk/high risk]\n\
         4. Technical analysis: short-term trend, support and resistance\n\
         5. Capital flow analysis: main-force intent, liquidity\n\
         6. Fundamental analysis: valuation, profitability, industry outlook\n\
         7. Advice: buy point, target price, stop loss, expected return, \
         holding period (e.g. 1-3 months), position size (e.g. 10-15%)\n\
         8. Risks: main risk factors and indicators to watch\n\
         Keep the language professional and the advice actionable.\n",
    );
    p
}

/// First line containing `label`, lowercased; the whole text otherwise.
fn section(lower: &str, label: &str) -> String {
    lower
        .lines()
        .find(|l| l.contains(label))
        .unwrap_or(lower)
        .to_string()
}

pub fn parse_reply(reply: &str, current_price: f64) -> LlmAnalysis {
    if reply.trim().is_empty() {
        return fallback_analysis(current_price);
    }
    let lower = reply.to_lowercase();

    let rating_text = section(&lower, "rating");
    let rating = if rating_text.contains("strong buy") {
        Rating::StrongBuy
    } else if rating_text.contains("buy") {
        Rating::Buy
    } else if rating_text.contains("neutral") {
        Rating::Neutral
    } else {
        Rating::Cautious
    };

    let risk_text = section(&lower, "risk:");
    let risk = if risk_text.contains("high risk") && !risk_text.contains("medium-high") {
        RiskLevel::High
    } else if risk_text.contains("low risk") && !risk_text.contains("medium-low") {
        RiskLevel::Low
    } else {
        RiskLevel::Medium
    };

    let (target_mult, expected_return) = if lower.contains("15-20%") {
        (1.175, 17.5)
    } else {
        (1.15, 15.0)
    };
    let stop_mult = if lower.contains("8-10%") { 0.91 } else { 0.92 };

    let holding_period_days = if lower.contains("3-6 month") {
        120
    } else if lower.contains("1-3 month") {
        60
    } else {
        90
    };

    let position_text = section(&lower, "position");
    let position_pct = if position_text.contains("10-15%") {
        12.5
    } else if position_text.contains("15-20%") {
        17.5
    } else {
        10.0
    };

    LlmAnalysis {
        text: reply.to_string(),
        rating,
        risk,
        target_price: round2(current_price * target_mult),
        stop_loss_price: round2(current_price * stop_mult),
        expected_return_pct: expected_return,
        holding_period_days,
        position_pct,
        buy_point: "at technical support or on a volume breakout".to_string(),
        sell_point: "at the target price or below the stop loss".to_string(),
        fallback: false,
    }
}

pub fn fallback_analysis(current_price: f64) -> LlmAnalysis {
    LlmAnalysis {
        text: "No model analysis available. The stock looks neutral; watch the market before acting."
            .to_string(),
        rating: Rating::Neutral,
        risk: RiskLevel::Medium,
        target_price: round2(current_price * 1.1),
        stop_loss_price: round2(current_price * 0.92),
        expected_return_pct: 10.0,
        holding_period_days: 60,
        position_pct: 5.0,
        buy_point: "wait for a clearer technical signal".to_string(),
        sell_point: "at the target price or on a risk signal".to_string(),
        fallback: true,
    }
}

pub fn deep_analyze(input: DeepAnalysisInput, client: &LlmClient<'_>) -> DeepAnalysisReport {
    info!(code = %input.code, "deep analysis started");
    let scores = CompositeScores::compute(
        &input.technical,
        &input.fundamentals,
        &input.flow,
        &input.auction,
    );
    let request = ChatRequest::new(build_prompt(&input)).with_system(SYSTEM_PROMPT);
    let reply = client.chat(Caller::DeepAnalysis, &request);
    if reply.is_empty() {
        warn!(code = %input.code, "no model reply, using fallback analysis");
    }
    let analysis = parse_reply(&reply, input.technical.current_price);

    DeepAnalysisReport {
        code: input.code,
        name: input.name,
        analyzed_at: chrono::Local::now().naive_local(),
        technical: input.technical,
        fundamentals: input.fundamentals,
        flow: input.flow,
        auction: input.auction,
        scores,
        analysis,
    }
}

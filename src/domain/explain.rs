//! Plain-language explanations for stock picks: why it was picked, where
//! to buy, when to sell and the expected risk/reward.

use crate::domain::pick::{Confidence, StockPick, round2};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongBuy,
    Buy,
    Watch,
}

impl Signal {
    pub fn from_score(total_score: f64) -> Signal {
        if total_score > 0.8 {
            Signal::StrongBuy
        } else if total_score > 0.6 {
            Signal::Buy
        } else {
            Signal::Watch
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::StrongBuy => "strong buy signal",
            Signal::Buy => "buy signal",
            Signal::Watch => "watch signal",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub signal: Signal,
    pub reason: String,
    pub signal_explanation: String,
    pub tech_explanation: String,
    pub buy_point_explanation: String,
    pub sell_logic: String,
    pub target_range: (f64, f64),
    /// Reward per unit of risk; `None` when the risk is unbounded or
    /// undefined (no valid stop below entry).
    pub expected_rr: Option<f64>,
    pub risk_reward_analysis: String,
}

/// Target price range as multiples of the entry price.
pub fn target_range(entry: f64, confidence: Confidence) -> (f64, f64) {
    if entry <= 0.0 {
        return (0.0, 0.0);
    }
    let (low, high) = match confidence {
        Confidence::VeryHigh => (1.15, 1.25),
        Confidence::High => (1.10, 1.18),
        Confidence::Medium => (1.06, 1.12),
    };
    (round2(entry * low), round2(entry * high))
}

/// (mid target - entry) / (entry - stop), when entry > stop > 0.
pub fn expected_risk_reward(entry: f64, stop: f64, range: (f64, f64)) -> Option<f64> {
    if entry > 0.0 && stop > 0.0 && entry > stop {
        let mid = (range.0 + range.1) / 2.0;
        Some(round2((mid - entry) / (entry - stop)))
    } else {
        None
    }
}

pub fn explain(pick: &StockPick) -> Explanation {
    let entry = if pick.entry_price > 0.0 {
        pick.entry_price
    } else {
        pick.current_price
    };
    let stop = pick.stop_loss;
    let signal = Signal::from_score(pick.total_score);
    let range = target_range(entry, pick.confidence);
    let rr = expected_risk_reward(entry, stop, range);

    Explanation {
        signal,
        reason: reason(pick, entry, stop, range),
        signal_explanation: signal_explanation(signal, pick.confidence, pick.total_score),
        tech_explanation: tech_explanation(pick.tech_score, pick.auction_score, pick.auction_ratio),
        buy_point_explanation: buy_point(entry, pick.auction_ratio, pick.confidence),
        sell_logic: sell_logic(pick.confidence, range.1, stop),
        target_range: range,
        expected_rr: rr,
        risk_reward_analysis: risk_reward_analysis(entry, stop, range, rr),
    }
}

fn confidence_phrase(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::VeryHigh => "several indicators confirm each other",
        Confidence::High => "technicals are strong",
        Confidence::Medium => "has upside potential",
    }
}

fn signal_explanation(signal: Signal, confidence: Confidence, total: f64) -> String {
    let confidence_text = match confidence {
        Confidence::VeryHigh => "very high confidence, multiple indicators agree",
        Confidence::High => "high confidence, technicals look strong",
        Confidence::Medium => "medium confidence, follow-through needs watching",
    };
    format!("{signal}: {confidence_text}, total score {total:.3}.")
}

fn tech_explanation(tech: f64, auction: f64, ratio: f64) -> String {
    let mut parts = Vec::new();
    parts.push(if tech > 0.7 {
        "strong technicals".to_string()
    } else if tech > 0.5 {
        "good technicals".to_string()
    } else {
        "average technicals".to_string()
    });
    if auction > 0.7 {
        parts.push("active auction".to_string());
    } else if auction > 0.5 {
        parts.push("steady auction".to_string());
    }
    if ratio > 2.0 {
        parts.push(format!("{ratio:.1}% gap-up shows buying interest"));
    } else if ratio > 0.0 {
        parts.push(format!("mild {ratio:.1}% gap-up"));
    } else if ratio < -2.0 {
        parts.push(format!("{ratio:.1}% gap-down shows selling pressure"));
    }
    format!("{}.", parts.join(", "))
}

fn reason(pick: &StockPick, entry: f64, stop: f64, range: (f64, f64)) -> String {
    let mut reasons = vec!["good technical setup".to_string()];
    if pick.auction_ratio > 2.0 {
        reasons.push(format!(
            "auction up {:.1}% draws attention",
            pick.auction_ratio
        ));
    } else if pick.auction_ratio > 0.0 {
        reasons.push("steady auction".to_string());
    }
    if pick.total_score > 0.8 {
        reasons.push("excellent total score".to_string());
    } else if pick.total_score > 0.6 {
        reasons.push("good total score".to_string());
    }
    reasons.push(confidence_phrase(pick.confidence).to_string());

    let mut text = format!("{} ({}): {}", pick.name, pick.board, reasons.join(", "));
    if entry > 0.0 && stop > 0.0 {
        text.push_str(&format!(". Buy near {entry:.2}, stop at {stop:.2}"));
        if range.0 > 0.0 && range.1 > 0.0 {
            text.push_str(&format!(", target {:.2}-{:.2}", range.0, range.1));
        }
    }
    text.push('.');
    text
}

fn buy_point(entry: f64, ratio: f64, confidence: Confidence) -> String {
    let open = if ratio > 3.0 {
        "a strong gap-up can be chased moderately"
    } else if ratio > 1.0 {
        "follow a higher open"
    } else if ratio > -1.0 {
        "after a flat open, watch volume"
    } else {
        "after a lower open, wait for it to stabilise"
    };
    let sizing = match confidence {
        Confidence::VeryHigh => "build a position actively",
        Confidence::High => "build a moderate position",
        Confidence::Medium => "start with a light position",
    };
    format!("Buy once the technical signal confirms, {open}, {sizing}, reference price {entry:.2}.")
}

fn sell_logic(confidence: Confidence, target_high: f64, stop: f64) -> String {
    let mut parts = Vec::new();
    if target_high > 0.0 {
        parts.push(format!("take profits in stages near {target_high:.2}"));
    }
    parts.push("cut the position if the technical pattern deteriorates".to_string());
    if stop > 0.0 {
        parts.push(format!("exit without hesitation below {stop:.2}"));
    }
    match confidence {
        Confidence::VeryHigh => parts.push("the profit target can be relaxed".to_string()),
        Confidence::Medium => parts.push("prefer quick in and out".to_string()),
        Confidence::High => {}
    }
    format!("{}.", parts.join("; "))
}

fn risk_reward_analysis(entry: f64, stop: f64, range: (f64, f64), rr: Option<f64>) -> String {
    if entry <= 0.0 || stop <= 0.0 {
        return "Risk/reward undetermined, trade with care.".to_string();
    }
    let risk_pct = round1((entry - stop) / entry * 100.0);
    if range.0 <= 0.0 || range.1 <= 0.0 {
        return format!("Potential risk {risk_pct}%, keep a strict stop loss.");
    }
    let low_pct = round1((range.0 - entry) / entry * 100.0);
    let high_pct = round1((range.1 - entry) / entry * 100.0);
    let (ratio_text, verdict) = match rr {
        Some(r) if r >= 2.0 => (format!("1:{r}"), "Good risk/reward, worth attention."),
        Some(r) if r >= 1.5 => (format!("1:{r}"), "Fair risk/reward, size the position carefully."),
        Some(r) => (format!("1:{r}"), "Poor risk/reward, participate cautiously."),
        None => ("unbounded".to_string(), "Poor risk/reward, participate cautiously."),
    };
    format!(
        "Expected return {low_pct}-{high_pct}%, potential risk {risk_pct}%, risk/reward {ratio_text}. {verdict}"
    )
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

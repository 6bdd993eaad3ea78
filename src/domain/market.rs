//! Symbol classification: market detection, A-share boards and the
//! delisting-risk filter applied before any candidate is analysed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    AShare,
    HongKong,
    Us,
}

impl Market {
    /// Detect the market from a user-entered code.
    ///
    /// Six digits is an A-share; an optional `HK` prefix followed by four or
    /// five digits is Hong Kong; one to five letters is a US ticker.
    /// Anything else falls back to A-share.
    pub fn detect(code: &str) -> Market {
        let code = code.trim().to_ascii_uppercase();
        let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

        if code.len() == 6 && all_digits(&code) {
            return Market::AShare;
        }
        let hk_digits = code.strip_prefix("HK").unwrap_or(&code);
        if (4..=5).contains(&hk_digits.len()) && all_digits(hk_digits) {
            return Market::HongKong;
        }
        if (1..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Market::Us;
        }
        Market::AShare
    }

    pub fn label(&self) -> &'static str {
        match self {
            Market::AShare => "A-share",
            Market::HongKong => "HK",
            Market::Us => "US",
        }
    }

    pub fn currency(&self) -> &'static str {
        match self {
            Market::AShare => "CNY",
            Market::HongKong => "HKD",
            Market::Us => "USD",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A-share listing board, derived from an exchange-prefixed symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Board {
    ShanghaiMain,
    ShenzhenMain,
    Sme,
    ChiNext,
    Other,
}

impl Board {
    pub fn classify(symbol: &str) -> Board {
        let symbol = symbol.trim().to_ascii_lowercase();
        if symbol.starts_with("sh.6") {
            Board::ShanghaiMain
        } else if symbol.starts_with("sz.000") {
            Board::ShenzhenMain
        } else if symbol.starts_with("sz.002") {
            Board::Sme
        } else if symbol.starts_with("sz.30") {
            Board::ChiNext
        } else {
            Board::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Board::ShanghaiMain => "Shanghai main",
            Board::ShenzhenMain => "Shenzhen main",
            Board::Sme => "SME",
            Board::ChiNext => "ChiNext",
            Board::Other => "Other",
        }
    }

    /// Parse a board name as written in config files and CLI flags.
    pub fn parse(name: &str) -> Option<Board> {
        match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "shanghai_main" | "sh_main" => Some(Board::ShanghaiMain),
            "shenzhen_main" | "sz_main" => Some(Board::ShenzhenMain),
            "sme" => Some(Board::Sme),
            "chinext" => Some(Board::ChiNext),
            "other" => Some(Board::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bare code without any `sh.`/`sz.` prefix.
pub fn bare_code(symbol: &str) -> &str {
    symbol.rsplit('.').next().unwrap_or(symbol).trim()
}

/// Convert a bare six-digit A-share code to `sh.`/`sz.` form. Symbols that
/// already carry a prefix are returned lowercased.
pub fn exchange_symbol(code: &str) -> String {
    let code = code.trim();
    if code.contains('.') {
        return code.to_ascii_lowercase();
    }
    if code.starts_with('6') || code.starts_with('9') {
        format!("sh.{code}")
    } else {
        format!("sz.{code}")
    }
}

pub const RISK_KEYWORDS: [&str; 7] = ["退", "ST", "*ST", "暂停", "终止", "破产", "清算"];

pub const DEFAULT_BLACKLIST: [&str; 7] = [
    "000606", "300090", "002680", "300156", "000536", "002359", "000753",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskVerdict {
    Clear,
    Risky(String),
}

impl RiskVerdict {
    pub fn is_risky(&self) -> bool {
        matches!(self, RiskVerdict::Risky(_))
    }
}

/// Rejects stocks whose name flags delisting risk or whose code is
/// blacklisted.
#[derive(Debug, Clone)]
pub struct RiskFilter {
    blacklist: HashSet<String>,
}

impl Default for RiskFilter {
    fn default() -> Self {
        Self::with_blacklist(DEFAULT_BLACKLIST.iter().map(|s| s.to_string()))
    }
}

impl RiskFilter {
    /// An empty blacklist falls back to the default one.
    pub fn with_blacklist<I: IntoIterator<Item = String>>(codes: I) -> Self {
        let blacklist: HashSet<String> = codes
            .into_iter()
            .map(|c| bare_code(&c).to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if blacklist.is_empty() {
            return Self::default();
        }
        Self { blacklist }
    }

    pub fn check(&self, symbol: &str, name: &str) -> RiskVerdict {
        if let Some(keyword) = RISK_KEYWORDS.iter().find(|k| name.contains(*k)) {
            return RiskVerdict::Risky(format!("name contains risk keyword {keyword}"));
        }
        if self.blacklist.contains(bare_code(symbol)) {
            return RiskVerdict::Risky("code is on the delisting blacklist".to_string());
        }
        RiskVerdict::Clear
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}

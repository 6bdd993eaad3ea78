//! Daily recommendation pipeline.
//!
//! For each candidate, in pool order: risk filter, bar fetch, price band,
//! relaxed technical score, auction score, weighted total, threshold.
//! With a model client attached, the first few candidates that pass the
//! risk filter are deep-analysed first and picked on their composite score
//! when it reaches the threshold.
//! Collection stops once twice the requested number of picks is reached;
//! picks are then ranked by total score and truncated.

use crate::domain::deep_analysis::{DeepAnalysisInput, DeepAnalysisReport, deep_analyze};
use crate::domain::explain::explain;
use crate::domain::llm::LlmClient;
use crate::domain::market::{RiskFilter, RiskVerdict};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::pick::{Candidate, Confidence, PickInputs, StockPick, round2};
use crate::domain::rule::Fundamentals;
use crate::domain::scoring::{AuctionData, AuctionStrength, CapitalFlow, GapType};
use crate::domain::strategy::StrategyConfig;
use crate::domain::technical::{TechnicalSnapshot, relaxed_tech_score};
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Bars needed before a candidate is scored.
pub const MIN_BARS: usize = 5;

/// Calendar window of history requested per candidate.
pub const HISTORY_DAYS: usize = 30;

/// Candidates deep-analysed per run when a model client is attached.
pub const DEEP_ANALYSIS_LIMIT: usize = 3;

/// Characters of model text kept as a deep pick's strategy line.
const STRATEGY_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Analyzing,
    DeepAnalysis,
    Sorting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Analyzing => "analyzing",
            Phase::DeepAnalysis => "deep_analysis",
            Phase::Sorting => "sorting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Progress<'a> {
    pub current: usize,
    pub total: usize,
    pub stock: Option<&'a Candidate>,
    pub message: String,
    pub phase: Phase,
}

/// Receives progress and is polled for cancellation between candidates.
pub trait PipelineObserver {
    fn on_progress(&self, _progress: &Progress<'_>) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub total_analyzed: usize,
    pub avg_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSummary {
    pub avg_auction_ratio: f64,
    pub gap_up_count: usize,
    pub flat_count: usize,
    pub gap_down_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStock {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationReport {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub picks: Vec<StockPick>,
    pub summary: MarketSummary,
    pub auction: AuctionSummary,
    pub skipped: Vec<SkippedStock>,
    pub cancelled: bool,
}

pub struct Recommender<'a> {
    data: &'a dyn DataPort,
    strategy: StrategyConfig,
    risk: RiskFilter,
    deep: Option<&'a LlmClient<'a>>,
}

impl<'a> Recommender<'a> {
    pub fn new(data: &'a dyn DataPort, strategy: StrategyConfig) -> Self {
        Self {
            data,
            strategy,
            risk: RiskFilter::default(),
            deep: None,
        }
    }

    pub fn with_risk_filter(mut self, risk: RiskFilter) -> Self {
        self.risk = risk;
        self
    }

    pub fn with_deep_analysis(mut self, client: &'a LlmClient<'a>) -> Self {
        self.deep = Some(client);
        self
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn run(&self, pool: &[Candidate], observer: &dyn PipelineObserver) -> RecommendationReport {
        let total = pool.len();
        let limit = self.strategy.max_recommendations;
        observer.on_progress(&Progress {
            current: 0,
            total,
            stock: None,
            message: format!("{total} candidates in pool"),
            phase: Phase::Init,
        });
        info!(candidates = total, limit, "recommendation run started");

        let mut picks = Vec::new();
        let mut skipped = Vec::new();
        let mut analysed = 0;
        let mut deep_runs = 0;
        let mut cancelled = false;

        for (i, candidate) in pool.iter().enumerate() {
            if observer.is_cancelled() {
                info!(analysed, "recommendation run cancelled");
                cancelled = true;
                break;
            }
            analysed += 1;
            observer.on_progress(&Progress {
                current: i + 1,
                total,
                stock: Some(candidate),
                message: format!("analysing {} ({})", candidate.name, candidate.symbol),
                phase: Phase::Analyzing,
            });

            if let RiskVerdict::Risky(reason) = self.risk.check(&candidate.symbol, &candidate.name) {
                debug!(symbol = %candidate.symbol, %reason, "risky candidate skipped");
                skipped.push(SkippedStock {
                    symbol: candidate.symbol.clone(),
                    reason,
                });
                continue;
            }

            let deep = match self.deep {
                Some(client) if deep_runs < DEEP_ANALYSIS_LIMIT => {
                    deep_runs += 1;
                    observer.on_progress(&Progress {
                        current: i + 1,
                        total,
                        stock: Some(candidate),
                        message: format!("deep analysis of {}", candidate.name),
                        phase: Phase::DeepAnalysis,
                    });
                    Some(client)
                }
                _ => None,
            };

            match self.evaluate(candidate, deep) {
                Ok(Some(pick)) => picks.push(pick),
                Ok(None) => {}
                Err(reason) => {
                    debug!(symbol = %candidate.symbol, %reason, "candidate skipped");
                    skipped.push(SkippedStock {
                        symbol: candidate.symbol.clone(),
                        reason,
                    });
                }
            }

            if picks.len() >= limit * 2 {
                debug!(picks = picks.len(), "enough picks collected, stopping early");
                break;
            }
        }

        observer.on_progress(&Progress {
            current: total,
            total,
            stock: None,
            message: "ranking picks".to_string(),
            phase: Phase::Sorting,
        });

        picks.sort_by(|a: &StockPick, b: &StockPick| b.total_score.total_cmp(&a.total_score));
        picks.truncate(limit);
        for pick in &mut picks {
            pick.explanation = Some(explain(pick));
        }

        let now = chrono::Local::now().naive_local();
        let report = RecommendationReport {
            date: now.date(),
            time: now.time(),
            summary: summarize(&picks, analysed),
            auction: summarize_auction(&picks),
            picks,
            skipped,
            cancelled,
        };
        info!(
            picks = report.picks.len(),
            analysed,
            cancelled,
            "recommendation run finished"
        );
        report
    }

    /// `Ok(None)` when the candidate was scored but did not qualify;
    /// `Err(reason)` when it could not be scored.
    fn evaluate(
        &self,
        candidate: &Candidate,
        deep: Option<&LlmClient<'_>>,
    ) -> Result<Option<StockPick>, String> {
        let bars = self
            .data
            .fetch_bars(&candidate.symbol, HISTORY_DAYS)
            .map_err(|e| {
                warn!(symbol = %candidate.symbol, error = %e, "failed to fetch bars");
                e.to_string()
            })?;
        if bars.len() < MIN_BARS {
            return Err(format!("only {} bars, need {MIN_BARS}", bars.len()));
        }
        let Some(last) = bars.last() else {
            return Err("no bars".to_string());
        };

        let price = last.close;
        if !self.strategy.price_in_band(price) {
            return Ok(None);
        }

        let snapshot = TechnicalSnapshot::from_bars(&bars);
        let (ratio, volume_ratio) = auction_inputs(candidate, &bars, &snapshot);
        if let Some(client) = deep {
            let auction = AuctionData {
                ratio,
                volume_ratio,
            };
            if let Some(pick) = self.deep_pick(candidate, &snapshot, auction, client) {
                return Ok(Some(pick));
            }
        }

        let tech_score = relaxed_tech_score(&bars);
        let strength = AuctionStrength::evaluate(ratio, volume_ratio);

        let total =
            tech_score * self.strategy.tech_weight + strength.strength() * self.strategy.auction_weight;
        debug!(
            symbol = %candidate.symbol,
            tech_score,
            auction = strength.strength(),
            total,
            "candidate scored"
        );
        if total < self.strategy.score_threshold {
            return Ok(None);
        }

        Ok(Some(StockPick::build(PickInputs {
            candidate,
            current_price: price,
            tech_score,
            auction_ratio: ratio,
            auction_strength: strength,
            total_score: total,
            rsi: snapshot.rsi,
            volume_ratio: snapshot.volume_ratio,
        })))
    }
}

impl Recommender<'_> {
    /// A pick from the composite deep score, or `None` to fall back to the
    /// basic score when the model gave no reply or the score is too low.
    fn deep_pick(
        &self,
        candidate: &Candidate,
        snapshot: &TechnicalSnapshot,
        auction: AuctionData,
        client: &LlmClient<'_>,
    ) -> Option<StockPick> {
        let report = deep_analyze(
            DeepAnalysisInput {
                code: candidate.symbol.clone(),
                name: candidate.name.clone(),
                technical: snapshot.clone(),
                fundamentals: Fundamentals {
                    market_cap_billion: candidate.market_cap_billion,
                    ..Fundamentals::default()
                },
                flow: CapitalFlow::default(),
                auction,
            },
            client,
        );
        if report.analysis.fallback {
            debug!(symbol = %candidate.symbol, "no model reply, using basic score");
            return None;
        }
        if report.scores.total < self.strategy.score_threshold {
            debug!(
                symbol = %candidate.symbol,
                total = report.scores.total,
                "deep score below threshold, using basic score"
            );
            return None;
        }
        info!(symbol = %candidate.symbol, total = report.scores.total, "deep analysis pick");
        Some(pick_from_deep(candidate, &report))
    }
}

/// Scores, prices and strategy text taken from a deep analysis.
fn pick_from_deep(candidate: &Candidate, report: &DeepAnalysisReport) -> StockPick {
    let scores = &report.scores;
    let analysis = &report.analysis;
    let price = report.technical.current_price;
    let mut pick = StockPick::build(PickInputs {
        candidate,
        current_price: price,
        tech_score: scores.technical,
        auction_ratio: report.auction.ratio,
        auction_strength: AuctionStrength::evaluate(report.auction.ratio, report.auction.volume_ratio),
        total_score: scores.total,
        rsi: report.technical.rsi,
        volume_ratio: report.technical.volume_ratio,
    });
    pick.auction_score = (scores.sentiment * 1000.0).round() / 1000.0;
    if let Some(confidence) = Confidence::parse(analysis.rating.confidence()) {
        pick.confidence = confidence;
    }
    pick.entry_price = round2(price);
    pick.stop_loss = round2(analysis.stop_loss_price);
    pick.target_price = round2(analysis.target_price);
    let text: String = analysis.text.chars().take(STRATEGY_CHARS).collect();
    pick.strategy = format!("{}...", text.trim());
    pick.breakout_signal = scores.total > 0.8;
    pick.volume_surge = scores.sentiment > 0.7;
    pick
}

/// Percent gap of the last bar's open over the previous close.
pub fn opening_gap(bars: &[OhlcvBar]) -> f64 {
    match bars {
        [.., prev, last] if prev.close > 0.0 => (last.open - prev.close) / prev.close * 100.0,
        _ => 0.0,
    }
}

/// Auction change and volume ratio from the pool entry, or from the last
/// bar's opening gap and relative volume when the pool has none.
fn auction_inputs(candidate: &Candidate, bars: &[OhlcvBar], snapshot: &TechnicalSnapshot) -> (f64, f64) {
    let ratio = candidate.auction_ratio.unwrap_or_else(|| opening_gap(bars));
    let volume_ratio = candidate
        .auction_volume_ratio
        .unwrap_or(snapshot.volume_ratio);
    (ratio, volume_ratio)
}

fn summarize(picks: &[StockPick], analysed: usize) -> MarketSummary {
    let avg = if picks.is_empty() {
        0.0
    } else {
        picks.iter().map(|p| p.total_score).sum::<f64>() / picks.len() as f64
    };
    MarketSummary {
        total_analyzed: analysed,
        avg_score: (avg * 1000.0).round() / 1000.0,
    }
}

fn summarize_auction(picks: &[StockPick]) -> AuctionSummary {
    let count = |g: GapType| picks.iter().filter(|p| p.gap_type == g).count();
    let avg = if picks.is_empty() {
        0.0
    } else {
        picks.iter().map(|p| p.auction_ratio).sum::<f64>() / picks.len() as f64
    };
    AuctionSummary {
        avg_auction_ratio: (avg * 100.0).round() / 100.0,
        gap_up_count: count(GapType::GapUp),
        flat_count: count(GapType::Flat),
        gap_down_count: count(GapType::GapDown),
    }
}

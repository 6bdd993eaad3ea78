//! Analysis engine: runs the active rules against one stock and combines
//! their scores into a weighted comprehensive score and a recommendation
//! tier.

use crate::domain::market::Market;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::rule::{AnalysisRule, Fundamentals, RuleContext, RuleInfo, Sentiment};
use crate::domain::rule_builtin::builtin_rules;
use crate::domain::technical::TechnicalSnapshot;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Score recorded for a rule that failed to evaluate.
pub const FAILED_RULE_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Reduce,
    Sell,
}

impl Recommendation {
    pub fn from_score(score: f64) -> Recommendation {
        if score >= 80.0 {
            Recommendation::StrongBuy
        } else if score >= 65.0 {
            Recommendation::Buy
        } else if score >= 45.0 {
            Recommendation::Hold
        } else if score >= 30.0 {
            Recommendation::Reduce
        } else {
            Recommendation::Sell
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::StrongBuy => "strong buy",
            Recommendation::Buy => "buy",
            Recommendation::Hold => "hold",
            Recommendation::Reduce => "reduce",
            Recommendation::Sell => "sell",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub id: String,
    pub name: String,
    pub score: f64,
    pub weight: f64,
    pub details: String,
    pub failed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub analyzed_at: NaiveDateTime,
    pub technical: Option<TechnicalSnapshot>,
    pub rule_results: Vec<RuleResult>,
    /// Weighted score in [0, 100], one decimal.
    pub comprehensive_score: f64,
    pub recommendation: Option<Recommendation>,
    pub active_rules: Vec<String>,
    pub error: Option<String>,
}

impl AnalysisReport {
    fn empty(code: &str, name: &str, market: Market, reason: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            market,
            analyzed_at: chrono::Local::now().naive_local(),
            technical: None,
            rule_results: Vec::new(),
            comprehensive_score: 0.0,
            recommendation: None,
            active_rules: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Default)]
pub struct AnalysisEngine {
    rules: Vec<Box<dyn AnalysisRule>>,
    active: Option<Vec<String>>,
}

impl AnalysisEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_rules() -> Self {
        let mut engine = Self::new();
        for rule in builtin_rules() {
            engine.register_rule(rule);
        }
        engine
    }

    /// Register a rule. A rule with an id already present replaces it in
    /// place.
    pub fn register_rule(&mut self, rule: Box<dyn AnalysisRule>) {
        match self.rules.iter().position(|r| r.id() == rule.id()) {
            Some(i) => self.rules[i] = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn rules(&self) -> Vec<RuleInfo> {
        self.rules.iter().map(|r| r.info()).collect()
    }

    /// Restrict analysis to `ids`, in the given order. Unknown ids are
    /// ignored when rules are resolved.
    pub fn set_active_rules<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active = Some(ids.into_iter().map(Into::into).collect());
    }

    pub fn clear_active_rules(&mut self) {
        self.active = None;
    }

    fn effective_rules(&self) -> Vec<&dyn AnalysisRule> {
        match &self.active {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.rules.iter().find(|r| r.id() == id.as_str()))
                .map(|r| r.as_ref())
                .collect(),
            None => self.rules.iter().map(|r| r.as_ref()).collect(),
        }
    }

    pub fn analyze(&self, ctx: &RuleContext) -> AnalysisReport {
        let rules = self.effective_rules();
        let mut results = Vec::with_capacity(rules.len());
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for rule in &rules {
            let weight = rule.weight();
            let (score, details, failed) = match rule.evaluate(ctx) {
                Ok(outcome) => (outcome.score.clamp(0.0, 100.0), outcome.details, false),
                Err(e) => {
                    warn!(rule = rule.id(), code = %ctx.code, error = %e, "rule evaluation failed");
                    (FAILED_RULE_SCORE, format!("evaluation failed: {e}"), true)
                }
            };
            debug!(rule = rule.id(), score, "rule evaluated");
            // A failed rule's placeholder score is shown but not counted.
            if !failed && weight > 0.0 {
                weighted_sum += score * weight;
                weight_total += weight;
            }
            results.push(RuleResult {
                id: rule.id().to_string(),
                name: rule.name().to_string(),
                score,
                weight,
                details,
                failed,
            });
        }

        let comprehensive = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            50.0
        };
        let comprehensive = (comprehensive * 10.0).round() / 10.0;

        info!(
            code = %ctx.code,
            score = comprehensive,
            rules = results.len(),
            "analysis complete"
        );

        AnalysisReport {
            code: ctx.code.clone(),
            name: ctx.name.clone(),
            market: ctx.market,
            analyzed_at: chrono::Local::now().naive_local(),
            technical: Some(ctx.technical.clone()),
            rule_results: results,
            comprehensive_score: comprehensive,
            recommendation: Some(Recommendation::from_score(comprehensive)),
            active_rules: rules.iter().map(|r| r.id().to_string()).collect(),
            error: None,
        }
    }

    /// Build the context from daily bars and analyse. No bars yields an
    /// empty report with score 0 and the reason in `error`.
    pub fn analyze_bars(
        &self,
        code: &str,
        name: &str,
        bars: &[OhlcvBar],
        fundamentals: Fundamentals,
        sentiment: Sentiment,
    ) -> AnalysisReport {
        let normalized = code.trim().to_ascii_uppercase();
        let market = Market::detect(&normalized);
        let name = if name.is_empty() { normalized.as_str() } else { name };

        if bars.is_empty() {
            warn!(code = %normalized, "no price data, returning empty report");
            return AnalysisReport::empty(&normalized, name, market, "no price data available");
        }

        let ctx = RuleContext {
            code: normalized.clone(),
            name: name.to_string(),
            market,
            technical: TechnicalSnapshot::from_bars(bars),
            fundamentals,
            sentiment,
        };
        self.analyze(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::StockpickError;
    use crate::domain::indicator::test_support::make_bars;
    use crate::domain::rule::RuleOutcome;

    struct Constant {
        id: &'static str,
        score: f64,
        weight: f64,
    }

    impl AnalysisRule for Constant {
        fn id(&self) -> &str {
            self.id
        }
        fn name(&self) -> &str {
            self.id
        }
        fn weight(&self) -> f64 {
            self.weight
        }
        fn evaluate(&self, _ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
            Ok(RuleOutcome::clamped(self.score, "constant"))
        }
    }

    struct Broken;

    impl AnalysisRule for Broken {
        fn id(&self) -> &str {
            "broken"
        }
        fn name(&self) -> &str {
            "Broken"
        }
        fn weight(&self) -> f64 {
            1.0
        }
        fn evaluate(&self, _ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
            Err(StockpickError::RuleFailed {
                rule_id: "broken".into(),
                reason: "boom".into(),
            })
        }
    }

    fn ctx() -> RuleContext {
        RuleContext {
            code: "600036".into(),
            name: "Test".into(),
            market: Market::AShare,
            technical: TechnicalSnapshot::default(),
            fundamentals: Fundamentals::default(),
            sentiment: Sentiment::default(),
        }
    }

    fn constant(id: &'static str, score: f64, weight: f64) -> Box<dyn AnalysisRule> {
        Box::new(Constant { id, score, weight })
    }

    #[test]
    fn tiers() {
        assert_eq!(Recommendation::from_score(80.0), Recommendation::StrongBuy);
        assert_eq!(Recommendation::from_score(65.0), Recommendation::Buy);
        assert_eq!(Recommendation::from_score(64.9), Recommendation::Hold);
        assert_eq!(Recommendation::from_score(30.0), Recommendation::Reduce);
        assert_eq!(Recommendation::from_score(29.9), Recommendation::Sell);
    }

    #[test]
    fn weighted_average_ignores_zero_weights() {
        let mut engine = AnalysisEngine::new();
        engine.register_rule(constant("a", 80.0, 0.6));
        engine.register_rule(constant("b", 40.0, 0.2));
        engine.register_rule(constant("info", 0.0, 0.0));

        let report = engine.analyze(&ctx());
        // (80*0.6 + 40*0.2) / 0.8 = 70
        assert_eq!(report.comprehensive_score, 70.0);
        assert_eq!(report.recommendation, Some(Recommendation::Buy));
        assert_eq!(report.rule_results.len(), 3);
    }

    #[test]
    fn no_weighted_rules_scores_fifty() {
        let mut engine = AnalysisEngine::new();
        engine.register_rule(constant("info", 90.0, 0.0));
        assert_eq!(engine.analyze(&ctx()).comprehensive_score, 50.0);
    }

    #[test]
    fn failing_rule_scores_fifty_and_continues() {
        let mut engine = AnalysisEngine::new();
        engine.register_rule(Box::new(Broken));
        engine.register_rule(constant("ok", 90.0, 1.0));

        let report = engine.analyze(&ctx());
        let broken = &report.rule_results[0];
        assert!(broken.failed);
        assert_eq!(broken.score, FAILED_RULE_SCORE);
        assert!(broken.details.contains("boom"));
        assert_eq!(report.comprehensive_score, 90.0);
    }

    #[test]
    fn only_failing_rules_gives_neutral_score() {
        let mut engine = AnalysisEngine::new();
        engine.register_rule(Box::new(Broken));
        let report = engine.analyze(&ctx());
        assert_eq!(report.comprehensive_score, 50.0);
        assert_eq!(report.rule_results.len(), 1);
    }

    #[test]
    fn active_rules_filter_and_order() {
        let mut engine = AnalysisEngine::new();
        engine.register_rule(constant("a", 10.0, 1.0));
        engine.register_rule(constant("b", 90.0, 1.0));
        engine.set_active_rules(["b", "missing"]);

        let report = engine.analyze(&ctx());
        assert_eq!(report.active_rules, vec!["b".to_string()]);
        assert_eq!(report.comprehensive_score, 90.0);

        engine.clear_active_rules();
        assert_eq!(engine.analyze(&ctx()).active_rules.len(), 2);
    }

    #[test]
    fn register_replaces_same_id() {
        let mut engine = AnalysisEngine::new();
        engine.register_rule(constant("a", 10.0, 1.0));
        engine.register_rule(constant("a", 20.0, 1.0));
        assert_eq!(engine.rules().len(), 1);
        assert_eq!(engine.analyze(&ctx()).comprehensive_score, 20.0);
    }

    #[test]
    fn builtin_rules_listed() {
        let engine = AnalysisEngine::with_builtin_rules();
        let ids: Vec<String> = engine.rules().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                "technical",
                "fundamental",
                "sentiment",
                "sector_tech",
                "sector_finance",
                "sector_consumer"
            ]
        );
    }

    #[test]
    fn analyze_bars_without_data() {
        let engine = AnalysisEngine::with_builtin_rules();
        let report = engine.analyze_bars(
            " aapl ",
            "",
            &[],
            Fundamentals::default(),
            Sentiment::default(),
        );
        assert_eq!(report.code, "AAPL");
        assert_eq!(report.market, Market::Us);
        assert_eq!(report.comprehensive_score, 0.0);
        assert!(report.error.is_some());
        assert!(report.recommendation.is_none());
    }

    #[test]
    fn analyze_bars_with_data() {
        let prices: Vec<f64> = (0..40).map(|i| 10.0 + i as f64 * 0.1).collect();
        let engine = AnalysisEngine::with_builtin_rules();
        let report = engine.analyze_bars(
            "600036",
            "招商银行",
            &make_bars(&prices),
            Fundamentals::default(),
            Sentiment::default(),
        );
        assert!(report.error.is_none());
        assert_eq!(report.rule_results.len(), 6);
        assert!((0.0..=100.0).contains(&report.comprehensive_score));
    }
}

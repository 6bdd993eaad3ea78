//! Built-in analysis rules: the three weighted general rules and three
//! informational sector rules.

use crate::domain::error::StockpickError;
use crate::domain::rule::{AnalysisRule, RuleContext, RuleOutcome};
use crate::domain::technical::{MacdSignal, MaTrend, VolumeStatus};

/// All built-in rules in registration order.
pub fn builtin_rules() -> Vec<Box<dyn AnalysisRule>> {
    vec![
        Box::new(TechnicalRule),
        Box::new(FundamentalRule),
        Box::new(SentimentRule),
        Box::new(TechSectorRule),
        Box::new(FinanceSectorRule),
        Box::new(ConsumerSectorRule),
    ]
}

pub struct TechnicalRule;

impl AnalysisRule for TechnicalRule {
    fn id(&self) -> &str {
        "technical"
    }

    fn name(&self) -> &str {
        "Technical analysis"
    }

    fn description(&self) -> &str {
        "Moving-average alignment, RSI, MACD, Bollinger position and volume"
    }

    fn weight(&self) -> f64 {
        0.40
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
        let tech = &ctx.technical;
        let mut score = 50.0;
        let mut details = Vec::new();

        match tech.ma_trend {
            MaTrend::BullishAlignment => {
                score += 20.0;
                details.push("bullish MA alignment (+20)".to_string());
            }
            MaTrend::BearishAlignment => {
                score -= 20.0;
                details.push("bearish MA alignment (-20)".to_string());
            }
            _ => details.push("MAs consolidating".to_string()),
        }

        let rsi = tech.rsi;
        if (30.0..=70.0).contains(&rsi) {
            score += 10.0;
            details.push(format!("RSI={rsi:.0} normal (+10)"));
        } else if rsi < 30.0 {
            score += 5.0;
            details.push(format!("RSI={rsi:.0} oversold (+5)"));
        } else {
            score -= 5.0;
            details.push(format!("RSI={rsi:.0} overbought (-5)"));
        }

        match tech.macd_signal {
            MacdSignal::GoldenCross => {
                score += 15.0;
                details.push("MACD golden cross (+15)".to_string());
            }
            MacdSignal::DeathCross => {
                score -= 15.0;
                details.push("MACD death cross (-15)".to_string());
            }
            _ => {}
        }

        if tech.bb_position < 0.2 {
            score += 10.0;
            details.push("near lower Bollinger band (+10)".to_string());
        } else if tech.bb_position > 0.8 {
            score -= 5.0;
            details.push("near upper Bollinger band (-5)".to_string());
        }

        match tech.volume_status {
            VolumeStatus::SurgeUp => {
                score += 10.0;
                details.push("rising on heavy volume (+10)".to_string());
            }
            VolumeStatus::SurgeDown => {
                score -= 10.0;
                details.push("falling on heavy volume (-10)".to_string());
            }
            _ => {}
        }

        Ok(RuleOutcome::clamped(score, details.join("; ")))
    }
}

pub struct FundamentalRule;

impl AnalysisRule for FundamentalRule {
    fn id(&self) -> &str {
        "fundamental"
    }

    fn name(&self) -> &str {
        "Fundamental analysis"
    }

    fn description(&self) -> &str {
        "Financial indicators: ROE, PE, debt ratio, valuation and forecasts"
    }

    fn weight(&self) -> f64 {
        0.40
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
        let fund = &ctx.fundamentals;
        let mut score = 50.0;
        let mut details = Vec::new();

        if fund.indicator_count >= 10 {
            score += 15.0;
            details.push(format!("{} indicators available (+15)", fund.indicator_count));
        }

        let roe = fund.roe.unwrap_or(0.0);
        if roe > 15.0 {
            score += 10.0;
            details.push(format!("ROE={roe:.1}% excellent (+10)"));
        } else if roe > 10.0 {
            score += 5.0;
            details.push(format!("ROE={roe:.1}% good (+5)"));
        } else if roe != 0.0 && roe < 5.0 {
            score -= 5.0;
            details.push(format!("ROE={roe:.1}% weak (-5)"));
        }

        let pe = fund.pe.unwrap_or(0.0);
        if pe > 0.0 && pe < 20.0 {
            score += 10.0;
            details.push(format!("PE={pe:.1} reasonable (+10)"));
        } else if pe > 50.0 {
            score -= 5.0;
            details.push(format!("PE={pe:.1} expensive (-5)"));
        }

        let debt = fund.debt_ratio.filter(|d| *d != 0.0).unwrap_or(50.0);
        if debt < 30.0 {
            score += 5.0;
            details.push(format!("debt ratio {debt:.0}% low (+5)"));
        } else if debt > 70.0 {
            score -= 10.0;
            details.push(format!("debt ratio {debt:.0}% high (-10)"));
        }

        if fund.has_valuation {
            score += 5.0;
        }
        if fund.has_forecast {
            score += 5.0;
        }

        let details = if details.is_empty() {
            "limited fundamental data".to_string()
        } else {
            details.join("; ")
        };
        Ok(RuleOutcome::clamped(score, details))
    }
}

pub struct SentimentRule;

impl AnalysisRule for SentimentRule {
    fn id(&self) -> &str {
        "sentiment"
    }

    fn name(&self) -> &str {
        "Market sentiment"
    }

    fn description(&self) -> &str {
        "Sentiment of news, announcements and research reports"
    }

    fn weight(&self) -> f64 {
        0.20
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
        let sent = &ctx.sentiment;
        let base = (sent.overall + 1.0) * 50.0;
        let coverage = (sent.total_analyzed as f64 / 100.0).min(1.0);
        let adjust = sent.confidence * 10.0 + coverage * 10.0;
        let score = ((base + adjust).clamp(0.0, 100.0) * 10.0).round() / 10.0;

        Ok(RuleOutcome::clamped(
            score,
            format!(
                "sentiment trend: {}, {} news items, confidence {:.0}%",
                sent.trend,
                sent.total_analyzed,
                sent.confidence * 100.0
            ),
        ))
    }
}

const TECH_KEYWORDS: [&str; 20] = [
    "科技", "半导体", "芯片", "电子", "软件", "信息", "通信", "互联网", "计算机", "AI",
    "人工智能", "数据", "云", "智能", "创达", "讯飞", "东方财富", "京东方", "歌尔", "海康",
];

const FINANCE_KEYWORDS: [&str; 14] = [
    "银行", "保险", "证券", "券商", "金融", "信托", "期货", "招商", "平安", "浦发", "兴业",
    "工商", "建设", "农业",
];

const CONSUMER_KEYWORDS: [&str; 17] = [
    "白酒", "消费", "食品", "饮料", "医药", "医疗", "生物", "茅台", "五粮液", "洋河", "伊利",
    "美的", "海尔", "爱尔", "智飞", "沃森", "恒瑞",
];

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

pub struct TechSectorRule;

impl AnalysisRule for TechSectorRule {
    fn id(&self) -> &str {
        "sector_tech"
    }

    fn name(&self) -> &str {
        "Tech sector bonus"
    }

    fn description(&self) -> &str {
        "Extra view for technology, semiconductor, AI and software stocks"
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
        let hit = mentions_any(&ctx.name, &TECH_KEYWORDS)
            || mentions_any(&ctx.fundamentals.industry, &TECH_KEYWORDS);
        if !hit {
            return Ok(RuleOutcome::clamped(50.0, "not a tech-sector stock"));
        }

        let mut score = 60.0;
        let mut details = vec!["tech sector".to_string()];
        if ctx.technical.volume_status == VolumeStatus::SurgeUp {
            score += 15.0;
            details.push("active money flow (+15)".to_string());
        }
        if ctx.technical.rsi < 60.0 {
            score += 10.0;
            details.push("not overbought (+10)".to_string());
        }
        Ok(RuleOutcome::clamped(score, details.join("; ")))
    }
}

pub struct FinanceSectorRule;

impl AnalysisRule for FinanceSectorRule {
    fn id(&self) -> &str {
        "sector_finance"
    }

    fn name(&self) -> &str {
        "Finance sector bonus"
    }

    fn description(&self) -> &str {
        "Extra view for banks, insurers and brokers: valuation and dividends"
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
        if !mentions_any(&ctx.name, &FINANCE_KEYWORDS) {
            return Ok(RuleOutcome::clamped(50.0, "not a finance-sector stock"));
        }

        let fund = &ctx.fundamentals;
        let mut score = 55.0;
        let mut details = vec!["finance sector".to_string()];

        let pe = fund.pe.unwrap_or(0.0);
        if pe > 0.0 && pe < 10.0 {
            score += 15.0;
            details.push(format!("low PE={pe:.1} (+15)"));
        } else if pe > 0.0 && pe < 15.0 {
            score += 8.0;
            details.push(format!("PE={pe:.1} reasonable (+8)"));
        }

        let dividend = fund.dividend_yield.unwrap_or(0.0);
        if dividend > 4.0 {
            score += 15.0;
            details.push(format!("high dividend {dividend:.1}% (+15)"));
        } else if dividend > 2.0 {
            score += 8.0;
            details.push(format!("dividend {dividend:.1}% (+8)"));
        }

        Ok(RuleOutcome::clamped(score, details.join("; ")))
    }
}

pub struct ConsumerSectorRule;

impl AnalysisRule for ConsumerSectorRule {
    fn id(&self) -> &str {
        "sector_consumer"
    }

    fn name(&self) -> &str {
        "Consumer sector bonus"
    }

    fn description(&self) -> &str {
        "Extra view for food, beverage, consumer and healthcare stocks"
    }

    fn weight(&self) -> f64 {
        0.0
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleOutcome, StockpickError> {
        if !mentions_any(&ctx.name, &CONSUMER_KEYWORDS) {
            return Ok(RuleOutcome::clamped(50.0, "not a consumer-sector stock"));
        }

        let fund = &ctx.fundamentals;
        let mut score = 55.0;
        let mut details = vec!["consumer sector".to_string()];

        let margin = fund.gross_margin.unwrap_or(0.0);
        if margin > 50.0 {
            score += 15.0;
            details.push(format!("high gross margin {margin:.0}% (+15)"));
        } else if margin > 30.0 {
            score += 8.0;
            details.push(format!("gross margin {margin:.0}% (+8)"));
        }

        let roe = fund.roe.unwrap_or(0.0);
        if roe > 20.0 {
            score += 10.0;
            details.push(format!("ROE={roe:.0}% excellent (+10)"));
        }

        Ok(RuleOutcome::clamped(score, details.join("; ")))
    }
}

//! Configuration validation.
//!
//! Validates strategy and scheduler settings before any run.

use crate::domain::error::StockpickError;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveTime;
use cron::Schedule;
use std::str::FromStr;

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, StockpickError> {
    let strategy = StrategyConfig::from_config(config);
    validate_strategy(&strategy)?;
    Ok(strategy)
}

pub fn validate_strategy(strategy: &StrategyConfig) -> Result<(), StockpickError> {
    validate_tech_weight(strategy)?;
    validate_auction_weight(strategy)?;
    validate_weight_sum(strategy)?;
    validate_score_threshold(strategy)?;
    validate_max_recommendations(strategy)?;
    validate_price_band(strategy)?;
    Ok(())
}

pub fn validate_scheduler_config(config: &dyn ConfigPort) -> Result<(), StockpickError> {
    let start = parse_time(config, "window_start", "09:25")?;
    let end = parse_time(config, "window_end", "09:29")?;
    if start > end {
        return Err(invalid(
            "scheduler",
            "window_start",
            "window_start must not be after window_end",
        ));
    }
    for key in ["main", "fallback"] {
        if let Some(expr) = config.get_string("scheduler", key) {
            Schedule::from_str(&expr)
                .map_err(|e| invalid("scheduler", key, &format!("invalid cron expression: {e}")))?;
        }
    }
    if config.get_int("scheduler", "poll_secs", 30) <= 0 {
        return Err(invalid("scheduler", "poll_secs", "poll_secs must be positive"));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> StockpickError {
    StockpickError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_time(config: &dyn ConfigPort, key: &str, default: &str) -> Result<NaiveTime, StockpickError> {
    let value = config
        .get_string("scheduler", key)
        .unwrap_or_else(|| default.to_string());
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| {
        invalid(
            "scheduler",
            key,
            &format!("invalid {key} format, expected HH:MM"),
        )
    })
}

fn validate_tech_weight(s: &StrategyConfig) -> Result<(), StockpickError> {
    if !(0.4..=0.8).contains(&s.tech_weight) {
        return Err(invalid(
            "strategy",
            "tech_weight",
            "tech_weight must be between 0.4 and 0.8",
        ));
    }
    Ok(())
}

fn validate_auction_weight(s: &StrategyConfig) -> Result<(), StockpickError> {
    if !(0.2..=0.6).contains(&s.auction_weight) {
        return Err(invalid(
            "strategy",
            "auction_weight",
            "auction_weight must be between 0.2 and 0.6",
        ));
    }
    Ok(())
}

fn validate_weight_sum(s: &StrategyConfig) -> Result<(), StockpickError> {
    if (s.tech_weight + s.auction_weight - 1.0).abs() > 0.01 {
        return Err(invalid(
            "strategy",
            "auction_weight",
            "tech_weight and auction_weight must sum to 1",
        ));
    }
    Ok(())
}

fn validate_score_threshold(s: &StrategyConfig) -> Result<(), StockpickError> {
    if !(0.5..=0.9).contains(&s.score_threshold) {
        return Err(invalid(
            "strategy",
            "score_threshold",
            "score_threshold must be between 0.5 and 0.9",
        ));
    }
    Ok(())
}

fn validate_max_recommendations(s: &StrategyConfig) -> Result<(), StockpickError> {
    if !(5..=50).contains(&s.max_recommendations) {
        return Err(invalid(
            "strategy",
            "max_recommendations",
            "max_recommendations must be between 5 and 50",
        ));
    }
    Ok(())
}

fn validate_price_band(s: &StrategyConfig) -> Result<(), StockpickError> {
    if !(1.0 <= s.min_price && s.min_price <= s.max_price && s.max_price <= 1000.0) {
        return Err(invalid(
            "strategy",
            "min_price",
            "price band must satisfy 1 <= min_price <= max_price <= 1000",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn assert_invalid_key(result: Result<(), StockpickError>, expected: &str) {
        match result {
            Err(StockpickError::ConfigInvalid { key, .. }) => assert_eq!(key, expected),
            other => panic!("expected ConfigInvalid for {expected}, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_strategy(&StrategyConfig::default()).is_ok());
    }

    #[test]
    fn tech_weight_range() {
        let s = StrategyConfig {
            tech_weight: 0.85,
            auction_weight: 0.15,
            ..StrategyConfig::default()
        };
        assert_invalid_key(validate_strategy(&s), "tech_weight");
    }

    #[test]
    fn auction_weight_range() {
        let s = StrategyConfig {
            tech_weight: 0.5,
            auction_weight: 0.65,
            ..StrategyConfig::default()
        };
        assert_invalid_key(validate_strategy(&s), "auction_weight");
    }

    #[test]
    fn weights_must_sum_to_one() {
        let s = StrategyConfig {
            tech_weight: 0.6,
            auction_weight: 0.3,
            ..StrategyConfig::default()
        };
        assert_invalid_key(validate_strategy(&s), "auction_weight");

        let close_enough = StrategyConfig {
            tech_weight: 0.6,
            auction_weight: 0.405,
            ..StrategyConfig::default()
        };
        assert!(validate_strategy(&close_enough).is_ok());
    }

    #[test]
    fn threshold_and_count_ranges() {
        let s = StrategyConfig {
            score_threshold: 0.45,
            ..StrategyConfig::default()
        };
        assert_invalid_key(validate_strategy(&s), "score_threshold");

        let s = StrategyConfig {
            max_recommendations: 51,
            ..StrategyConfig::default()
        };
        assert_invalid_key(validate_strategy(&s), "max_recommendations");
    }

    #[test]
    fn price_band_rules() {
        for (min, max) in [(0.5, 10.0), (20.0, 10.0), (5.0, 1001.0)] {
            let s = StrategyConfig {
                min_price: min,
                max_price: max,
                ..StrategyConfig::default()
            };
            assert_invalid_key(validate_strategy(&s), "min_price");
        }
        let s = StrategyConfig {
            min_price: 10.0,
            max_price: 10.0,
            ..StrategyConfig::default()
        };
        assert!(validate_strategy(&s).is_ok());
    }

    #[test]
    fn validate_from_config_file() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\nscore_threshold = 0.95\n").unwrap();
        assert!(validate_strategy_config(&adapter).is_err());

        let adapter = FileConfigAdapter::from_string("[strategy]\n").unwrap();
        assert_eq!(
            validate_strategy_config(&adapter).unwrap(),
            StrategyConfig::default()
        );
    }

    #[test]
    fn scheduler_config_checks() {
        let ok = FileConfigAdapter::from_string(
            "[scheduler]\nwindow_start = 09:25\nwindow_end = 09:29\nmain = 0 25-28,30 9 * * Mon-Fri\n",
        )
        .unwrap();
        assert!(validate_scheduler_config(&ok).is_ok());

        let bad_time = FileConfigAdapter::from_string("[scheduler]\nwindow_start = 9h\n").unwrap();
        assert_invalid_key(validate_scheduler_config(&bad_time), "window_start");

        let reversed = FileConfigAdapter::from_string(
            "[scheduler]\nwindow_start = 10:00\nwindow_end = 09:00\n",
        )
        .unwrap();
        assert_invalid_key(validate_scheduler_config(&reversed), "window_start");

        let bad_cron = FileConfigAdapter::from_string("[scheduler]\nfallback = not cron\n").unwrap();
        assert_invalid_key(validate_scheduler_config(&bad_cron), "fallback");

        let bad_poll = FileConfigAdapter::from_string("[scheduler]\npoll_secs = 0\n").unwrap();
        assert_invalid_key(validate_scheduler_config(&bad_poll), "poll_secs");
    }
}

//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); 100 when avg_loss == 0.
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let invalid = |bar: &OhlcvBar| IndicatorPoint {
        date: bar.date,
        valid: false,
        value: IndicatorValue::Simple(0.0),
    };

    if period == 0 || bars.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: bars.iter().map(invalid).collect(),
        };
    }

    let mut values = Vec::with_capacity(bars.len());
    values.push(invalid(&bars[0]));

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, window) in bars.windows(2).enumerate() {
        let change = window[1].close - window[0].close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if i < period {
            avg_gain += gain / period as f64;
            avg_loss += loss / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }

        if i + 1 < period {
            values.push(invalid(&window[1]));
            continue;
        }

        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
        values.push(IndicatorPoint {
            date: window[1].date,
            valid: true,
            value: IndicatorValue::Simple(rsi),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    #[test]
    fn rsi_warmup_period() {
        let prices: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&make_bars(&prices), 14);

        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "Bar {} should be invalid", i);
        }
        assert!(series.values[14].valid);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&make_bars(&prices), 14);
        assert_eq!(series.last_simple(), Some(100.0));
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&make_bars(&prices), 14);
        let rsi = series.last_simple().unwrap();
        assert!(rsi.abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_in_range() {
        let prices: Vec<f64> = (1..=30)
            .map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0)
            .collect();
        let series = calculate_rsi(&make_bars(&prices), 14);
        for point in series.values.iter().filter(|p| p.valid) {
            if let IndicatorValue::Simple(rsi) = point.value {
                assert!((0.0..=100.0).contains(&rsi), "RSI {} out of range", rsi);
            }
        }
    }

    #[test]
    fn rsi_single_bar_and_zero_period() {
        let one = calculate_rsi(&make_bars(&[100.0]), 14);
        assert_eq!(one.values.len(), 1);
        assert!(!one.values[0].valid);

        let zero = calculate_rsi(&make_bars(&[100.0, 101.0]), 0);
        assert!(zero.values.iter().all(|p| !p.valid));
    }
}

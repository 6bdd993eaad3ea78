//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! All three use the history-normalised EMA, so every bar is valid.

use crate::domain::indicator::ema::ewm_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[OhlcvBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if bars.is_empty() || fast == 0 || slow == 0 || signal_period == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let macd_line: Vec<f64> = ewm_mean(&closes, fast)
        .iter()
        .zip(ewm_mean(&closes, slow))
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ewm_mean(&macd_line, signal_period);

    let values = bars
        .iter()
        .zip(macd_line.iter().zip(&signal_line))
        .map(|(bar, (&line, &signal))| IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Macd {
                line,
                signal,
                histogram: line - signal,
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    fn rising(n: usize) -> Vec<OhlcvBar> {
        let prices: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        make_bars(&prices)
    }

    fn default_macd(bars: &[OhlcvBar]) -> IndicatorSeries {
        calculate_macd(bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
    }

    fn parts(point: &IndicatorPoint) -> (f64, f64, f64) {
        match point.value {
            IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } => (line, signal, histogram),
            _ => panic!("Expected Macd value"),
        }
    }

    #[test]
    fn macd_valid_from_first_bar() {
        let series = default_macd(&rising(5));
        assert_eq!(series.values.len(), 5);
        assert!(series.values.iter().all(|p| p.valid));
        // One close: both averages equal it.
        assert_eq!(parts(&series.values[0]), (0.0, 0.0, 0.0));
    }

    #[test]
    fn macd_histogram_equals_line_minus_signal() {
        let series = default_macd(&rising(40));
        for point in &series.values {
            let (line, signal, histogram) = parts(point);
            assert!((histogram - (line - signal)).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let series = default_macd(&rising(30));
        let (line, _, histogram) = parts(series.last_valid().unwrap());
        assert!(line > 0.0);
        assert!(histogram > 0.0);
    }

    #[test]
    fn macd_line_is_fast_minus_slow_average() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ewm_mean(&closes, 3);
        let slow = ewm_mean(&closes, 5);
        let series = calculate_macd(&bars, 3, 5, 2);
        for (i, point) in series.values.iter().enumerate() {
            assert!((parts(point).0 - (fast[i] - slow[i])).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn macd_zero_period_or_empty() {
        let bars = make_bars(&[100.0, 101.0, 102.0]);
        assert!(calculate_macd(&bars, 0, 26, 9).values.is_empty());
        assert!(calculate_macd(&bars, 12, 0, 9).values.is_empty());
        assert!(calculate_macd(&bars, 12, 26, 0).values.is_empty());
        assert!(default_macd(&[]).values.is_empty());
    }
}

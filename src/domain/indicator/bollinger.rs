//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N).
//! Warmup: first (period-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STDDEV_MULT_X100: u32 = 200;

pub fn calculate_bollinger(
    bars: &[OhlcvBar],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Bollinger {
        period,
        stddev_mult_x100,
    };
    if period == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let mult = stddev_mult_x100 as f64 / 100.0;
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let valid = i + 1 >= period;
        let (upper, middle, lower) = if valid {
            let window = &bars[i + 1 - period..=i];
            let middle = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|b| (b.close - middle).powi(2))
                .sum::<f64>()
                / period as f64;
            let stddev = variance.sqrt();
            (middle + mult * stddev, middle, middle - mult * stddev)
        } else {
            (0.0, 0.0, 0.0)
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            },
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}

/// Where `price` sits inside the band, 0 at the lower band and 1 at the
/// upper. Collapsed bands map to 0.5.
pub fn band_position(price: f64, upper: f64, lower: f64) -> f64 {
    let width = upper - lower;
    if width <= f64::EPSILON {
        0.5
    } else {
        (price - lower) / width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    fn bands(series: &IndicatorSeries, i: usize) -> (f64, f64, f64) {
        match series.values[i].value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => (upper, middle, lower),
            _ => panic!("Expected Bollinger value"),
        }
    }

    #[test]
    fn bollinger_warmup() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_bollinger(&bars, 3, 200);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2..].iter().all(|p| p.valid));
    }

    #[test]
    fn bollinger_constant_values_collapse() {
        let bars = make_bars(&[100.0; 5]);
        let series = calculate_bollinger(&bars, 3, 200);
        let (upper, middle, lower) = bands(&series, 4);
        assert!((middle - 100.0).abs() < f64::EPSILON);
        assert!((upper - lower).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_population_stddev() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let series = calculate_bollinger(&bars, 3, 200);
        let (upper, middle, lower) = bands(&series, 2);

        let stddev = (200.0_f64 / 3.0).sqrt();
        assert!((middle - 20.0).abs() < 1e-10);
        assert!((upper - (20.0 + 2.0 * stddev)).abs() < 1e-10);
        assert!((lower - (20.0 - 2.0 * stddev)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_multiplier_scales_width() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let (u1, m1, _) = bands(&calculate_bollinger(&bars, 3, 100), 2);
        let (u2, m2, _) = bands(&calculate_bollinger(&bars, 3, 200), 2);
        assert!(((u2 - m2) - 2.0 * (u1 - m1)).abs() < 1e-10);
    }

    #[test]
    fn band_position_edges() {
        assert!((band_position(110.0, 110.0, 90.0) - 1.0).abs() < f64::EPSILON);
        assert!(band_position(90.0, 110.0, 90.0).abs() < f64::EPSILON);
        assert!((band_position(100.0, 110.0, 90.0) - 0.5).abs() < f64::EPSILON);
        assert!((band_position(42.0, 100.0, 100.0) - 0.5).abs() < f64::EPSILON);
    }
}

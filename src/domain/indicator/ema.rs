//! Exponential Moving Average.
//!
//! Span-weighted mean with alpha = 2/(n+1). Each value is the weighted
//! mean of all closes so far, weights (1-alpha)^age normalised over the
//! history seen, so the first bar already has a value:
//!
//!   num[i] = C[i] + (1-alpha)*num[i-1]
//!   den[i] = 1    + (1-alpha)*den[i-1]
//!   EMA[i] = num[i] / den[i]

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

/// Span-weighted mean of `values`, one output per input.
pub fn ewm_mean(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 {
        return Vec::new();
    }
    let decay = 1.0 - 2.0 / (span as f64 + 1.0);
    let mut num = 0.0;
    let mut den = 0.0;
    values
        .iter()
        .map(|&x| {
            num = x + decay * num;
            den = 1.0 + decay * den;
            num / den
        })
        .collect()
}

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let values = ewm_mean(&closes, period)
        .into_iter()
        .zip(bars)
        .map(|(ema, bar)| IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(ema),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}

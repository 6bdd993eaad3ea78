//! Technical snapshot of the latest bar: moving-average alignment, RSI,
//! MACD direction, Bollinger position and volume state.
//!
//! Moving averages use whatever history is available (a 20-bar average
//! over 7 bars is the mean of those 7), so a snapshot can be taken from
//! any non-empty series.

use crate::domain::indicator::bollinger::{self, band_position};
use crate::domain::indicator::macd;
use crate::domain::indicator::rsi;
use crate::domain::indicator::sma::trailing_mean;
use crate::domain::indicator::{
    IndicatorValue, calculate_bollinger, calculate_macd, calculate_rsi,
};
use crate::domain::ohlcv::{OhlcvBar, closes};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaTrend {
    BullishAlignment,
    BearishAlignment,
    ShortTermUp,
    ShortTermDown,
    Consolidating,
    Insufficient,
}

impl MaTrend {
    /// Price-anchored alignment: price > MA5 > MA10 > MA20 or the strict
    /// reverse, else consolidating.
    pub fn classify(price: f64, ma5: f64, ma10: f64, ma20: f64) -> MaTrend {
        if price > ma5 && ma5 > ma10 && ma10 > ma20 {
            MaTrend::BullishAlignment
        } else if price < ma5 && ma5 < ma10 && ma10 < ma20 {
            MaTrend::BearishAlignment
        } else {
            MaTrend::Consolidating
        }
    }

    /// Average-only alignment with short-term variants when only MA5 and
    /// MA10 are ordered.
    pub fn classify_averages(ma5: f64, ma10: f64, ma20: f64) -> MaTrend {
        if ma5 > ma10 && ma10 > ma20 {
            MaTrend::BullishAlignment
        } else if ma5 < ma10 && ma10 < ma20 {
            MaTrend::BearishAlignment
        } else if ma5 > ma10 {
            MaTrend::ShortTermUp
        } else if ma5 < ma10 {
            MaTrend::ShortTermDown
        } else {
            MaTrend::Consolidating
        }
    }
}

impl fmt::Display for MaTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MaTrend::BullishAlignment => "bullish alignment",
            MaTrend::BearishAlignment => "bearish alignment",
            MaTrend::ShortTermUp => "short-term up",
            MaTrend::ShortTermDown => "short-term down",
            MaTrend::Consolidating => "consolidating",
            MaTrend::Insufficient => "insufficient data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdSignal {
    GoldenCross,
    DeathCross,
    Sideways,
    Insufficient,
}

impl fmt::Display for MacdSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MacdSignal::GoldenCross => "golden cross",
            MacdSignal::DeathCross => "death cross",
            MacdSignal::Sideways => "sideways",
            MacdSignal::Insufficient => "insufficient data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    SurgeUp,
    SurgeDown,
    Shrinking,
    Moderate,
    Insufficient,
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeStatus::SurgeUp => "volume surge up",
            VolumeStatus::SurgeDown => "volume surge down",
            VolumeStatus::Shrinking => "shrinking volume",
            VolumeStatus::Moderate => "moderate volume",
            VolumeStatus::Insufficient => "insufficient data",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,
    pub ma_trend: MaTrend,
    pub rsi: f64,
    pub macd_signal: MacdSignal,
    /// Last MACD line minus signal line; positive means the line is above.
    pub macd_histogram: f64,
    pub bb_position: f64,
    pub volume_status: VolumeStatus,
    pub current_price: f64,
    /// Percent change of the last close against the previous one.
    pub price_change: f64,
    pub volume_ratio: f64,
}

impl Default for TechnicalSnapshot {
    fn default() -> Self {
        Self {
            ma5: 0.0,
            ma10: 0.0,
            ma20: 0.0,
            ma_trend: MaTrend::Insufficient,
            rsi: 50.0,
            macd_signal: MacdSignal::Insufficient,
            macd_histogram: 0.0,
            bb_position: 0.5,
            volume_status: VolumeStatus::Insufficient,
            current_price: 0.0,
            price_change: 0.0,
            volume_ratio: 1.0,
        }
    }
}

impl TechnicalSnapshot {
    pub fn from_bars(bars: &[OhlcvBar]) -> TechnicalSnapshot {
        let Some(last) = bars.last() else {
            return TechnicalSnapshot::default();
        };
        let closes = closes(bars);
        let price = last.close;

        let ma5 = trailing_mean(&closes, 5).unwrap_or(price);
        let ma10 = trailing_mean(&closes, 10).unwrap_or(price);
        let ma20 = trailing_mean(&closes, 20).unwrap_or(price);

        let rsi = calculate_rsi(bars, rsi::DEFAULT_PERIOD)
            .last_simple()
            .unwrap_or(50.0);

        let bb_period = bollinger::DEFAULT_PERIOD.min(bars.len());
        let bb_position = match calculate_bollinger(
            bars,
            bb_period,
            bollinger::DEFAULT_STDDEV_MULT_X100,
        )
        .last_valid()
        .map(|p| p.value.clone())
        {
            Some(IndicatorValue::Bollinger { upper, lower, .. }) => {
                band_position(price, upper, lower)
            }
            _ => 0.5,
        };

        let price_change = match bars.len() {
            n if n >= 2 => last.change_pct(bars[n - 2].close),
            _ => 0.0,
        };

        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let avg_volume = trailing_mean(&volumes, 20).unwrap_or(0.0);
        let volume_status = if last.volume > avg_volume * 1.5 {
            if price_change > 0.0 {
                VolumeStatus::SurgeUp
            } else {
                VolumeStatus::SurgeDown
            }
        } else if last.volume < avg_volume * 0.5 {
            VolumeStatus::Shrinking
        } else {
            VolumeStatus::Moderate
        };

        let (macd_signal, macd_histogram) = macd_signal(bars);

        TechnicalSnapshot {
            ma5,
            ma10,
            ma20,
            ma_trend: MaTrend::classify(price, ma5, ma10, ma20),
            rsi,
            macd_signal,
            macd_histogram,
            bb_position,
            volume_status,
            current_price: price,
            price_change,
            volume_ratio: last.volume / avg_volume.max(1.0),
        }
    }

    /// Average-only alignment, which distinguishes short-term moves.
    pub fn ma_alignment(&self) -> MaTrend {
        if self.ma_trend == MaTrend::Insufficient {
            return MaTrend::Insufficient;
        }
        MaTrend::classify_averages(self.ma5, self.ma10, self.ma20)
    }
}

/// Signal from the last two histogram values, plus the last histogram.
fn macd_signal(bars: &[OhlcvBar]) -> (MacdSignal, f64) {
    let series = calculate_macd(
        bars,
        macd::DEFAULT_FAST,
        macd::DEFAULT_SLOW,
        macd::DEFAULT_SIGNAL,
    );
    let mut hist = series.values.iter().rev().map(|p| match p.value {
        IndicatorValue::Macd { histogram, .. } => histogram,
        _ => 0.0,
    });
    let (Some(cur), Some(prev)) = (hist.next(), hist.next()) else {
        return (MacdSignal::Insufficient, 0.0);
    };
    let signal = if cur > prev && cur > 0.0 {
        MacdSignal::GoldenCross
    } else if cur < prev && cur < 0.0 {
        MacdSignal::DeathCross
    } else {
        MacdSignal::Sideways
    };
    (signal, cur)
}

/// Lenient short-window technical score in [0, 1] used to rank candidates.
pub fn relaxed_tech_score(bars: &[OhlcvBar]) -> f64 {
    let Some(last) = bars.last() else {
        return 0.4;
    };
    let closes = closes(bars);
    let price = last.close;
    let n = bars.len();
    let mut score: f64 = 0.4;

    if n >= 5 {
        if let Some(ma5) = trailing_mean(&closes, 5) {
            if price >= ma5 * 0.98 {
                score += 0.2;
            }
        }
        if n >= 10 {
            if let Some(ma10) = trailing_mean(&closes, 10) {
                if price >= ma10 * 0.96 {
                    score += 0.15;
                }
            }
        }
    }

    if n >= 3 && closes[n - 3] > 0.0 {
        let trend = (price - closes[n - 3]) / closes[n - 3];
        if trend > -0.05 {
            score += 0.15;
        }
        if trend > 0.02 {
            score += 0.1;
        }
    }

    if n >= 5 {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        if let Some(vol_ma) = trailing_mean(&volumes, 5) {
            if last.volume > vol_ma * 0.8 {
                score += 0.1;
            }
        }
    }

    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;
    use approx::assert_relative_eq;

    fn with_volumes(prices: &[f64], volumes: &[f64]) -> Vec<OhlcvBar> {
        let mut bars = make_bars(prices);
        for (bar, v) in bars.iter_mut().zip(volumes) {
            bar.volume = *v;
        }
        bars
    }

    #[test]
    fn empty_input_is_neutral() {
        let snap = TechnicalSnapshot::from_bars(&[]);
        assert_eq!(snap.ma_trend, MaTrend::Insufficient);
        assert_eq!(snap.rsi, 50.0);
        assert_eq!(snap.bb_position, 0.5);
        assert_eq!(snap.ma_alignment(), MaTrend::Insufficient);
    }

    #[test]
    fn steady_uptrend_is_bullish() {
        let prices: Vec<f64> = (0..40).map(|i| 10.0 + i as f64 * 0.2).collect();
        let snap = TechnicalSnapshot::from_bars(&make_bars(&prices));
        assert_eq!(snap.ma_trend, MaTrend::BullishAlignment);
        assert_eq!(snap.ma_alignment(), MaTrend::BullishAlignment);
        assert_eq!(snap.rsi, 100.0);
        assert!(snap.bb_position > 0.8);
        assert_relative_eq!(snap.current_price, 17.8, epsilon = 1e-9);
    }

    #[test]
    fn steady_downtrend_is_bearish() {
        let prices: Vec<f64> = (0..40).map(|i| 30.0 - i as f64 * 0.2).collect();
        let snap = TechnicalSnapshot::from_bars(&make_bars(&prices));
        assert_eq!(snap.ma_trend, MaTrend::BearishAlignment);
        assert!(snap.rsi < 1e-9);
    }

    #[test]
    fn short_series_uses_defaults() {
        let snap = TechnicalSnapshot::from_bars(&make_bars(&[10.0, 10.5, 11.0]));
        assert_eq!(snap.rsi, 50.0);
        assert_eq!(snap.macd_signal, MacdSignal::GoldenCross);
        assert!(snap.macd_histogram > 0.0);
        assert_relative_eq!(snap.price_change, 0.5 / 10.5 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn macd_signal_needs_only_two_bars() {
        let one = TechnicalSnapshot::from_bars(&make_bars(&[10.0]));
        assert_eq!(one.macd_signal, MacdSignal::Insufficient);

        let up = TechnicalSnapshot::from_bars(&make_bars(&[10.0, 10.5]));
        assert_eq!(up.macd_signal, MacdSignal::GoldenCross);
        let down = TechnicalSnapshot::from_bars(&make_bars(&[10.0, 9.5]));
        assert_eq!(down.macd_signal, MacdSignal::DeathCross);
    }

    #[test]
    fn macd_signal_over_pipeline_history() {
        // 30 bars, the pipeline's fetch length
        let accelerating: Vec<f64> = (0..30).map(|i| 10.0 + 0.02 * (i * i) as f64).collect();
        let snap = TechnicalSnapshot::from_bars(&make_bars(&accelerating));
        assert_eq!(snap.macd_signal, MacdSignal::GoldenCross);

        // A steady climb keeps the line above the signal while the gap narrows.
        let linear: Vec<f64> = (0..30).map(|i| 10.0 + i as f64 * 0.1).collect();
        let snap = TechnicalSnapshot::from_bars(&make_bars(&linear));
        assert_eq!(snap.macd_signal, MacdSignal::Sideways);
        assert!(snap.macd_histogram > 0.0);

        let falling: Vec<f64> = (0..30).map(|i| 30.0 - 0.02 * (i * i) as f64).collect();
        let snap = TechnicalSnapshot::from_bars(&make_bars(&falling));
        assert_eq!(snap.macd_signal, MacdSignal::DeathCross);
        assert!(snap.macd_histogram < 0.0);
    }

    #[test]
    fn volume_surge_follows_price_direction() {
        let mut volumes = vec![1000.0; 10];
        volumes[9] = 5000.0;

        let mut up: Vec<f64> = vec![10.0; 10];
        up[9] = 10.5;
        let snap = TechnicalSnapshot::from_bars(&with_volumes(&up, &volumes));
        assert_eq!(snap.volume_status, VolumeStatus::SurgeUp);

        let mut down: Vec<f64> = vec![10.0; 10];
        down[9] = 9.5;
        let snap = TechnicalSnapshot::from_bars(&with_volumes(&down, &volumes));
        assert_eq!(snap.volume_status, VolumeStatus::SurgeDown);

        volumes[9] = 100.0;
        let snap = TechnicalSnapshot::from_bars(&with_volumes(&up, &volumes));
        assert_eq!(snap.volume_status, VolumeStatus::Shrinking);
    }

    #[test]
    fn classify_averages_short_term() {
        assert_eq!(
            MaTrend::classify_averages(11.0, 10.0, 12.0),
            MaTrend::ShortTermUp
        );
        assert_eq!(
            MaTrend::classify_averages(9.0, 10.0, 8.0),
            MaTrend::ShortTermDown
        );
        assert_eq!(
            MaTrend::classify_averages(10.0, 10.0, 10.0),
            MaTrend::Consolidating
        );
    }

    #[test]
    fn relaxed_score_full_marks() {
        let prices: Vec<f64> = (0..12).map(|i| 10.0 + i as f64 * 0.3).collect();
        assert_relative_eq!(relaxed_tech_score(&make_bars(&prices)), 1.0);
    }

    #[test]
    fn relaxed_score_falling_stock() {
        let prices: Vec<f64> = (0..12).map(|i| 20.0 - i as f64).collect();
        let mut volumes = vec![1000.0; 12];
        volumes[11] = 100.0;
        assert_relative_eq!(
            relaxed_tech_score(&with_volumes(&prices, &volumes)),
            0.4,
            epsilon = 1e-12
        );
    }

    #[test]
    fn relaxed_score_short_history() {
        assert_relative_eq!(relaxed_tech_score(&[]), 0.4);
        // Flat three bars: only the 3-bar drawdown check applies.
        assert_relative_eq!(
            relaxed_tech_score(&make_bars(&[10.0, 10.0, 10.0])),
            0.55,
            epsilon = 1e-12
        );
    }
}

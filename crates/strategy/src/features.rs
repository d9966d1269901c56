use common::models::OhlcvBar;

use crate::indicators::{IndicatorRow, Indicators};

pub const FEATURE_COUNT: usize = 10;

/// Normalized snapshot of the latest bar, fed to the scoring model.
/// Every element is finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.0.iter().map(|&v| v as f32).collect()
    }
}

pub struct FeatureVectorBuilder;

impl FeatureVectorBuilder {
    /// Builds the vector from the newest row; `None` for an empty window.
    pub fn from_indicators(indicators: &Indicators) -> Option<FeatureVector> {
        let (bar, row) = indicators.latest()?;
        Some(Self::build(bar, row, indicators.volatility()))
    }

    pub fn build(bar: &OhlcvBar, row: &IndicatorRow, volatility: f64) -> FeatureVector {
        let close = bar.close;
        FeatureVector([
            ratio(close, row.sma_20, 1.0),
            ratio(close, row.sma_5, 1.0),
            position(close, bar.low, bar.high),
            or_default(row.rsi / 100.0, 0.5),
            if close > 0.0 {
                or_default(row.macd / close, 0.0)
            } else {
                0.0
            },
            position(close, row.bb_lower, row.bb_upper),
            or_default(row.volume_ratio, 1.0),
            or_default(row.price_change, 0.0),
            or_default(row.price_change_5d, 0.0),
            or_default(volatility, 0.0),
        ])
    }
}

fn or_default(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

fn ratio(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator > 0.0 {
        or_default(numerator / denominator, fallback)
    } else {
        fallback
    }
}

/// Where `value` sits inside `[low, high]`; 0.5 for a degenerate range.
fn position(value: f64, low: f64, high: f64) -> f64 {
    if high > low {
        or_default((value - low) / (high - low), 0.5)
    } else {
        0.5
    }
}

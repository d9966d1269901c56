//! Technical indicators over an OHLCV window.
//!
//! Every value is NaN while its warm-up window is incomplete. EMAs are the
//! recursive, non-adjusted kind seeded with the first price, so they (and
//! MACD) are defined from the first bar.

mod warmup;

use common::models::OhlcvBar;
use ta::Next;
use ta::indicators::{BollingerBands, ExponentialMovingAverage, SimpleMovingAverage};
use thiserror::Error;

use crate::stats::population_std;
use warmup::Warmup;

pub const SMA_FAST: usize = 5;
pub const SMA_SLOW: usize = 20;
pub const EMA_FAST: usize = 12;
pub const EMA_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const RSI_PERIOD: usize = 14;
pub const BB_PERIOD: usize = 20;
pub const BB_MULTIPLIER: f64 = 2.0;
pub const VOLUME_PERIOD: usize = 20;
pub const MOMENTUM_PERIOD: usize = 5;

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("invalid indicator parameter: {0:?}")]
    Parameter(ta::errors::TaError),
}

impl From<ta::errors::TaError> for IndicatorError {
    fn from(err: ta::errors::TaError) -> Self {
        Self::Parameter(err)
    }
}

/// Derived values for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorRow {
    pub sma_5: f64,
    pub sma_20: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub rsi: f64,
    pub bb_middle: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub volume_sma: f64,
    pub volume_ratio: f64,
    pub price_change: f64,
    pub price_change_5d: f64,
}

/// Indicator rows aligned with the chronologically sorted bars they came from.
#[derive(Debug, Clone)]
pub struct Indicators {
    bars: Vec<OhlcvBar>,
    rows: Vec<IndicatorRow>,
    volatility: f64,
}

impl Indicators {
    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn rows(&self) -> &[IndicatorRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest(&self) -> Option<(&OhlcvBar, &IndicatorRow)> {
        Some((self.bars.last()?, self.rows.last()?))
    }

    /// Population std of the defined 1-bar price changes; NaN if there are none.
    pub fn volatility(&self) -> f64 {
        self.volatility
    }
}

/// Rolling state for one pass over a window.
struct Pipeline {
    sma_fast: Warmup<SimpleMovingAverage>,
    sma_slow: Warmup<SimpleMovingAverage>,
    ema_fast: ExponentialMovingAverage,
    ema_slow: ExponentialMovingAverage,
    macd_signal: ExponentialMovingAverage,
    avg_gain: Warmup<SimpleMovingAverage>,
    avg_loss: Warmup<SimpleMovingAverage>,
    bollinger: Warmup<BollingerBands>,
    volume_sma: Warmup<SimpleMovingAverage>,
}

impl Pipeline {
    fn new() -> Result<Self, IndicatorError> {
        Ok(Self {
            sma_fast: Warmup::new(SimpleMovingAverage::new(SMA_FAST)?, SMA_FAST),
            sma_slow: Warmup::new(SimpleMovingAverage::new(SMA_SLOW)?, SMA_SLOW),
            ema_fast: ExponentialMovingAverage::new(EMA_FAST)?,
            ema_slow: ExponentialMovingAverage::new(EMA_SLOW)?,
            macd_signal: ExponentialMovingAverage::new(MACD_SIGNAL)?,
            avg_gain: Warmup::new(SimpleMovingAverage::new(RSI_PERIOD)?, RSI_PERIOD),
            avg_loss: Warmup::new(SimpleMovingAverage::new(RSI_PERIOD)?, RSI_PERIOD),
            bollinger: Warmup::new(BollingerBands::new(BB_PERIOD, BB_MULTIPLIER)?, BB_PERIOD),
            volume_sma: Warmup::new(SimpleMovingAverage::new(VOLUME_PERIOD)?, VOLUME_PERIOD),
        })
    }

    fn row(&mut self, closes: &[f64], bar: &OhlcvBar) -> IndicatorRow {
        let t = closes.len() - 1;
        let close = closes[t];

        let ema_12 = self.ema_fast.next(close);
        let ema_26 = self.ema_slow.next(close);
        let macd = ema_12 - ema_26;
        let macd_signal = self.macd_signal.next(macd);

        let rsi = if t == 0 {
            f64::NAN
        } else {
            let delta = close - closes[t - 1];
            let gain = self.avg_gain.next(delta.max(0.0));
            let loss = self.avg_loss.next((-delta).max(0.0));
            match (gain, loss) {
                (Some(gain), Some(loss)) => relative_strength_index(gain, loss),
                _ => f64::NAN,
            }
        };

        let (bb_middle, bb_upper, bb_lower) = match self.bollinger.next(close) {
            Some(bands) => (bands.average, bands.upper, bands.lower),
            None => (f64::NAN, f64::NAN, f64::NAN),
        };

        let volume_sma = self.volume_sma.next(bar.volume).unwrap_or(f64::NAN);
        let volume_ratio = if volume_sma.is_finite() && volume_sma != 0.0 {
            bar.volume / volume_sma
        } else {
            f64::NAN
        };

        IndicatorRow {
            sma_5: self.sma_fast.next(close).unwrap_or(f64::NAN),
            sma_20: self.sma_slow.next(close).unwrap_or(f64::NAN),
            ema_12,
            ema_26,
            macd,
            macd_signal,
            rsi,
            bb_middle,
            bb_upper,
            bb_lower,
            volume_sma,
            volume_ratio,
            price_change: pct_change(closes, 1),
            price_change_5d: pct_change(closes, MOMENTUM_PERIOD),
        }
    }
}

/// `100 - 100 / (1 + gain/loss)`, pinned to 100 when there were no losses.
pub fn relative_strength_index(avg_gain: f64, avg_loss: f64) -> f64 {
    // Running sums can drift a hair below zero once the window is all zeros.
    let (avg_gain, avg_loss) = (avg_gain.max(0.0), avg_loss.max(0.0));
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Fractional change of the last close over `periods` bars.
fn pct_change(closes: &[f64], periods: usize) -> f64 {
    let t = closes.len() - 1;
    if t < periods {
        return f64::NAN;
    }
    let base = closes[t - periods];
    if base == 0.0 {
        return f64::NAN;
    }
    closes[t] / base - 1.0
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Sorts `bars` oldest first and computes one row per bar.
    pub fn compute(&self, bars: &[OhlcvBar]) -> Result<Indicators, IndicatorError> {
        let mut bars = bars.to_vec();
        bars.sort_by_key(|b| b.timestamp);

        let mut pipeline = Pipeline::new()?;
        let mut closes = Vec::with_capacity(bars.len());
        let mut rows = Vec::with_capacity(bars.len());

        for bar in &bars {
            closes.push(bar.close);
            rows.push(pipeline.row(&closes, bar));
        }

        let changes: Vec<f64> = rows
            .iter()
            .map(|r| r.price_change)
            .filter(|c| c.is_finite())
            .collect();
        let volatility = population_std(&changes).unwrap_or(f64::NAN);

        Ok(Indicators {
            bars,
            rows,
            volatility,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bars_from_closes, linear_closes};

    fn compute(closes: &[f64]) -> Indicators {
        IndicatorEngine::new()
            .compute(&bars_from_closes("TEST", closes))
            .unwrap()
    }

    fn close_enough(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_warmup_windows_are_nan() {
        let closes = linear_closes(100.0, 1.0, 30);
        let ind = compute(&closes);
        let rows = ind.rows();

        assert!(rows[3].sma_5.is_nan());
        assert!(rows[4].sma_5.is_finite());
        assert!(rows[18].sma_20.is_nan());
        assert!(rows[19].sma_20.is_finite());
        assert!(rows[18].bb_upper.is_nan());
        assert!(rows[19].bb_upper.is_finite());
        assert!(rows[13].rsi.is_nan());
        assert!(rows[14].rsi.is_finite());
        assert!(rows[0].price_change.is_nan());
        assert!(rows[4].price_change_5d.is_nan());
        assert!(rows[5].price_change_5d.is_finite());
        assert!(rows[18].volume_ratio.is_nan());
        assert!(rows[19].volume_ratio.is_finite());
        // Recursive EMAs are seeded with the first close.
        assert_eq!(rows[0].ema_12, 100.0);
        assert_eq!(rows[0].macd, 0.0);
    }

    #[test]
    fn test_reorders_newest_first_input() {
        let closes = linear_closes(10.0, 2.0, 25);
        let mut bars = bars_from_closes("TEST", &closes);
        let expected = IndicatorEngine::new().compute(&bars).unwrap();
        bars.reverse();
        let reordered = IndicatorEngine::new().compute(&bars).unwrap();

        assert_eq!(reordered.bars()[0].close, 10.0);
        assert_eq!(reordered.latest().unwrap().0.close, 58.0);
        let (a, b) = (expected.latest().unwrap().1, reordered.latest().unwrap().1);
        assert!(close_enough(a.sma_20, b.sma_20));
        assert!(close_enough(a.macd, b.macd));
    }

    #[test]
    fn test_sma_and_pct_change_values() {
        let closes = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0];
        let ind = compute(&closes);
        let last = ind.latest().unwrap().1;
        assert!(close_enough(last.sma_5, 13.0));
        assert!(close_enough(last.price_change, 15.0 / 14.0 - 1.0));
        assert!(close_enough(last.price_change_5d, 0.5));
    }

    #[test]
    fn test_ema_recursion_matches_definition() {
        let closes = [10.0, 20.0, 15.0];
        let ind = compute(&closes);
        let k = 2.0 / 13.0;
        let e1 = 20.0 * k + 10.0 * (1.0 - k);
        let e2 = 15.0 * k + e1 * (1.0 - k);
        assert!(close_enough(ind.rows()[1].ema_12, e1));
        assert!(close_enough(ind.rows()[2].ema_12, e2));
    }

    #[test]
    fn test_constant_prices_pin_rsi_to_100() {
        let ind = compute(&vec![50.0; 35]);
        let last = ind.latest().unwrap().1;
        assert_eq!(last.rsi, 100.0);
        assert_eq!(last.macd, 0.0);
        assert!(close_enough(last.bb_upper, 50.0));
        assert!(close_enough(last.bb_lower, 50.0));
        assert_eq!(ind.volatility(), 0.0);
    }

    #[test]
    fn test_rising_and_falling_rsi_extremes() {
        let up = compute(&linear_closes(100.0, 1.0, 35));
        assert_eq!(up.latest().unwrap().1.rsi, 100.0);

        let down = compute(&linear_closes(135.0, -1.0, 35));
        assert!(close_enough(down.latest().unwrap().1.rsi, 0.0));
    }

    #[test]
    fn test_rsi_mixed_moves() {
        // Alternating +2 / -1 moves: avg gain 1.0, avg loss 0.5 over 14 deltas.
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        let ind = compute(&closes);
        let expected = 100.0 - 100.0 / (1.0 + 2.0);
        assert!(close_enough(ind.latest().unwrap().1.rsi, expected));
    }

    #[test]
    fn test_rsi_formula_edge() {
        assert_eq!(relative_strength_index(0.0, 0.0), 100.0);
        assert_eq!(relative_strength_index(0.0, 1.0), 0.0);
        assert!(close_enough(relative_strength_index(1.0, 1.0), 50.0));
    }

    #[test]
    fn test_zero_volume_leaves_ratio_undefined() {
        let mut bars = bars_from_closes("TEST", &linear_closes(1.0, 1.0, 25));
        for bar in &mut bars {
            bar.volume = 0.0;
        }
        let ind = IndicatorEngine::new().compute(&bars).unwrap();
        assert!(ind.latest().unwrap().1.volume_ratio.is_nan());
    }

    #[test]
    fn test_empty_input() {
        let ind = compute(&[]);
        assert!(ind.is_empty());
        assert!(ind.latest().is_none());
        assert!(ind.volatility().is_nan());
    }
}

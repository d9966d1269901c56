//! Rule-cascade signal engine.
//!
//! Starting from HOLD at 0.5 confidence, each rule may propose BUY or SELL.
//! A proposal is dropped when it opposes an action set by an earlier rule;
//! HOLD is always overridable.

use common::models::{
    Action, AnalysisOutcome, InsufficientData, OhlcvBar, TechnicalData, TradingSignal,
};
use tracing::debug;

use crate::features::{FeatureVector, FeatureVectorBuilder};
use crate::indicators::{IndicatorEngine, IndicatorError, IndicatorRow, Indicators};

pub const NO_DATA_REASON: &str = "Insufficient data";
pub const SHORT_HISTORY_REASON: &str = "Insufficient data for analysis";

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionParams {
    pub min_bars: usize,
    pub base_confidence: f64,
    pub max_confidence: f64,
    pub base_position_size: f64,
    pub target_volatility: f64,
    pub max_volatility_factor: f64,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            min_bars: 30,
            base_confidence: 0.5,
            max_confidence: 0.95,
            base_position_size: 1000.0,
            target_volatility: 0.02,
            max_volatility_factor: 2.0,
        }
    }
}

struct Proposal {
    action: Action,
    weight: f64,
    reason: &'static str,
}

impl Proposal {
    fn buy(weight: f64, reason: &'static str) -> Option<Self> {
        Some(Self {
            action: Action::Buy,
            weight,
            reason,
        })
    }

    fn sell(weight: f64, reason: &'static str) -> Option<Self> {
        Some(Self {
            action: Action::Sell,
            weight,
            reason,
        })
    }
}

/// A rule looks at the latest bar and row and proposes at most one action.
/// NaN inputs compare false, so undefined indicators never fire.
type Rule = fn(&OhlcvBar, &IndicatorRow) -> Option<Proposal>;

fn rsi_rule(_: &OhlcvBar, row: &IndicatorRow) -> Option<Proposal> {
    if row.rsi < 30.0 {
        Proposal::buy(0.2, "RSI oversold")
    } else if row.rsi > 70.0 {
        Proposal::sell(0.2, "RSI overbought")
    } else {
        None
    }
}

fn macd_rule(_: &OhlcvBar, row: &IndicatorRow) -> Option<Proposal> {
    if row.macd > row.macd_signal && row.macd > 0.0 {
        Proposal::buy(0.15, "MACD bullish crossover")
    } else if row.macd < row.macd_signal && row.macd < 0.0 {
        Proposal::sell(0.15, "MACD bearish crossover")
    } else {
        None
    }
}

fn trend_rule(bar: &OhlcvBar, row: &IndicatorRow) -> Option<Proposal> {
    if bar.close > row.sma_20 && row.sma_5 > row.sma_20 {
        Proposal::buy(0.1, "Price above moving averages")
    } else if bar.close < row.sma_20 && row.sma_5 < row.sma_20 {
        Proposal::sell(0.1, "Price below moving averages")
    } else {
        None
    }
}

fn bollinger_rule(bar: &OhlcvBar, row: &IndicatorRow) -> Option<Proposal> {
    if bar.close < row.bb_lower {
        Proposal::buy(0.1, "Price at lower Bollinger Band")
    } else if bar.close > row.bb_upper {
        Proposal::sell(0.1, "Price at upper Bollinger Band")
    } else {
        None
    }
}

const RULES: [Rule; 4] = [rsi_rule, macd_rule, trend_rule, bollinger_rule];

#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    action: Action,
    confidence: f64,
    reasons: Vec<String>,
}

impl Verdict {
    fn new(base_confidence: f64) -> Self {
        Self {
            action: Action::Hold,
            confidence: base_confidence,
            reasons: Vec::new(),
        }
    }

    fn apply(&mut self, proposal: Proposal) {
        if self.action.opposes(proposal.action) {
            return;
        }
        self.action = proposal.action;
        self.confidence += proposal.weight;
        self.reasons.push(proposal.reason.to_string());
    }
}

/// Outcome of one analysis plus the feature vector, when one could be built.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub outcome: AnalysisOutcome,
    pub features: Option<FeatureVector>,
}

#[derive(Debug, Clone, Default)]
pub struct SignalDecisionEngine {
    indicators: IndicatorEngine,
    params: DecisionParams,
}

impl SignalDecisionEngine {
    pub fn new(params: DecisionParams) -> Self {
        Self {
            indicators: IndicatorEngine::new(),
            params,
        }
    }

    pub fn params(&self) -> &DecisionParams {
        &self.params
    }

    /// Analyses a window of bars in any order.
    pub fn analyze(&self, symbol: &str, bars: &[OhlcvBar]) -> Result<Analysis, IndicatorError> {
        if bars.is_empty() {
            return Ok(Self::insufficient(symbol, NO_DATA_REASON));
        }
        if bars.len() < self.params.min_bars {
            debug!("{}: {} bars, {} required", symbol, bars.len(), self.params.min_bars);
            return Ok(Self::insufficient(symbol, SHORT_HISTORY_REASON));
        }

        let indicators = self.indicators.compute(bars)?;
        let features = FeatureVectorBuilder::from_indicators(&indicators);
        let outcome = match self.evaluate(symbol, &indicators) {
            Some(signal) => AnalysisOutcome::Signal(signal),
            None => AnalysisOutcome::Insufficient(InsufficientData::new(symbol, NO_DATA_REASON)),
        };
        Ok(Analysis { outcome, features })
    }

    fn insufficient(symbol: &str, reason: &str) -> Analysis {
        Analysis {
            outcome: AnalysisOutcome::Insufficient(InsufficientData::new(symbol, reason)),
            features: None,
        }
    }

    /// Runs the cascade over the newest row. `None` only for an empty window.
    pub fn evaluate(&self, symbol: &str, indicators: &Indicators) -> Option<TradingSignal> {
        let (bar, row) = indicators.latest()?;

        let mut verdict = Verdict::new(self.params.base_confidence);
        for rule in RULES {
            if let Some(proposal) = rule(bar, row) {
                verdict.apply(proposal);
            }
        }

        let confidence = verdict.confidence.clamp(0.0, self.params.max_confidence);
        Some(TradingSignal {
            symbol: symbol.to_string(),
            action: verdict.action,
            confidence,
            suggested_position_size: self.position_size(confidence, indicators.volatility()),
            reasons: verdict.reasons,
            current_price: bar.close,
            technical_data: TechnicalData {
                rsi: defined(row.rsi),
                macd: defined(row.macd),
                volume_ratio: defined(row.volume_ratio),
            },
        })
    }

    /// `base × confidence`, scaled by `min(target / volatility, cap)` when
    /// volatility is positive, rounded to cents.
    pub fn position_size(&self, confidence: f64, volatility: f64) -> f64 {
        let mut size = self.params.base_position_size * confidence;
        if volatility > 0.0 {
            let factor = (self.params.target_volatility / volatility)
                .min(self.params.max_volatility_factor);
            size *= factor;
        }
        (size * 100.0).round() / 100.0
    }
}

fn defined(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const SQL_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    /// BUY and SELL are opposites; HOLD has no opposite.
    pub fn opposes(&self, other: Action) -> bool {
        matches!(
            (self, other),
            (Self::Buy, Self::Sell) | (Self::Sell, Self::Buy)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Indicator snapshot attached to a signal. `None` is written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalData {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub volume_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub suggested_position_size: f64,
    pub reasons: Vec<String>,
    pub current_price: f64,
    pub technical_data: TechnicalData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientData {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
}

impl InsufficientData {
    pub fn new(symbol: &str, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: Action::Hold,
            confidence: 0.0,
            reason: reason.to_string(),
        }
    }
}

/// Result of analysing one symbol, serialized as either wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Signal(TradingSignal),
    Insufficient(InsufficientData),
}

impl AnalysisOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            Self::Signal(s) => &s.symbol,
            Self::Insufficient(i) => &i.symbol,
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Self::Signal(s) => s.action,
            Self::Insufficient(i) => i.action,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Signal(s) => s.confidence,
            Self::Insufficient(i) => i.confidence,
        }
    }

    pub fn suggested_position_size(&self) -> f64 {
        match self {
            Self::Signal(s) => s.suggested_position_size,
            Self::Insufficient(_) => 0.0,
        }
    }

    /// The row persisted for this outcome.
    pub fn to_record(&self, timestamp: NaiveDateTime) -> SignalRecord {
        SignalRecord {
            symbol: self.symbol().to_string(),
            action: self.action(),
            confidence: self.confidence(),
            suggested_position_size: self.suggested_position_size(),
            timestamp,
        }
    }
}

/// A persisted signal, also the entry shape of `get_positions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub suggested_position_size: f64,
    #[serde(with = "sql_timestamp")]
    pub timestamp: NaiveDateTime,
}

mod sql_timestamp {
    use super::SQL_TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(SQL_TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, SQL_TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

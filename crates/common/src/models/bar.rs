use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One OHLCV bar as stored in `market_data`. Timestamps are naive UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct OhlcvBarInsert {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: NaiveDateTime,
}

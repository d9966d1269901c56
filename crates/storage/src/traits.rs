use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use common::models::{OhlcvBar, SignalRecord};

use crate::error::StorageError;

/// Time-ordered source of OHLCV history.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    /// Bars of `symbol` from the last `lookback`, newest first.
    async fn fetch_bars(
        &self,
        symbol: &str,
        lookback: Duration,
    ) -> Result<Vec<OhlcvBar>, StorageError>;
}

/// Durable journal of produced signals.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn record(&self, record: &SignalRecord) -> Result<(), StorageError>;

    /// At most `limit` signals recorded after `since`, by descending confidence.
    async fn top_since(
        &self,
        since: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<SignalRecord>, StorageError>;
}

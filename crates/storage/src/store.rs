use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use common::models::{OhlcvBar, SignalRecord};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StorageError;
use crate::repositories::{MarketDataRepository, SignalsRepository};
use crate::traits::{MarketDataStore, SignalSink};

/// SQLite-backed bar store and signal journal sharing one pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MarketDataStore for SqliteStore {
    async fn fetch_bars(
        &self,
        symbol: &str,
        lookback: Duration,
    ) -> Result<Vec<OhlcvBar>, StorageError> {
        let until = Utc::now().naive_utc();
        let since = until
            .checked_sub_signed(lookback)
            .ok_or(StorageError::LookbackOutOfRange(lookback))?;
        let bars = MarketDataRepository::fetch_range(&self.pool, symbol, since, until).await?;
        debug!("Fetched {} bars for {}", bars.len(), symbol);
        Ok(bars)
    }
}

#[async_trait]
impl SignalSink for SqliteStore {
    async fn record(&self, record: &SignalRecord) -> Result<(), StorageError> {
        SignalsRepository::insert(&self.pool, record).await?;
        Ok(())
    }

    async fn top_since(
        &self,
        since: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<SignalRecord>, StorageError> {
        SignalsRepository::fetch_recent(&self.pool, since, limit).await
    }
}

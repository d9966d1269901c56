use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use common::models::{OhlcvBar, SignalRecord};
use mockall::mock;
use storage::{MarketDataStore, SignalSink, StorageError};
use strategy::{FEATURE_COUNT, ScoringModel, SignalDecisionEngine};

use crate::handler::RequestHandler;

pub(crate) use strategy::test_support::{bars_from_closes, linear_closes};

mock! {
    pub Store {}

    #[async_trait]
    impl MarketDataStore for Store {
        async fn fetch_bars(
            &self,
            symbol: &str,
            lookback: Duration,
        ) -> Result<Vec<OhlcvBar>, StorageError>;
    }
}

mock! {
    pub Sink {}

    #[async_trait]
    impl SignalSink for Sink {
        async fn record(&self, record: &SignalRecord) -> Result<(), StorageError>;
        async fn top_since(
            &self,
            since: NaiveDateTime,
            limit: i64,
        ) -> Result<Vec<SignalRecord>, StorageError>;
    }
}

pub(crate) fn handler_with(store: MockStore, sink: MockSink) -> RequestHandler {
    RequestHandler::new(
        Arc::new(store),
        Arc::new(sink),
        SignalDecisionEngine::default(),
        ScoringModel::simulated(FEATURE_COUNT),
        Duration::days(30),
    )
}

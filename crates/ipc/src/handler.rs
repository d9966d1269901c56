use std::sync::Arc;

use chrono::{Duration, Utc};
use common::models::AnalysisOutcome;
use storage::{MarketDataStore, SignalSink, StorageError};
use strategy::{IndicatorError, ScoringModel, SignalDecisionEngine};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::{Command, Response};

pub const POSITIONS_LIMIT: i64 = 10;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Indicators(#[from] IndicatorError),
}

/// Executes one command against the store, the decision engine and the sink.
pub struct RequestHandler {
    store: Arc<dyn MarketDataStore>,
    sink: Arc<dyn SignalSink>,
    engine: SignalDecisionEngine,
    scorer: ScoringModel,
    lookback: Duration,
    positions_window: Duration,
}

impl RequestHandler {
    pub fn new(
        store: Arc<dyn MarketDataStore>,
        sink: Arc<dyn SignalSink>,
        engine: SignalDecisionEngine,
        scorer: ScoringModel,
        lookback: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            engine,
            scorer,
            lookback,
            positions_window: Duration::hours(1),
        }
    }

    pub async fn handle(&self, command: Command) -> Result<Response, HandlerError> {
        match command {
            Command::Analyze { symbol } => Ok(Response::Analysis(self.analyze(&symbol).await?)),
            Command::BatchAnalyze { symbols } => {
                let mut results = Vec::with_capacity(symbols.len());
                for symbol in &symbols {
                    results.push(self.analyze(symbol).await?);
                }
                Ok(Response::Batch { results })
            }
            Command::GetPositions => {
                let since = Utc::now().naive_utc() - self.positions_window;
                let positions = self.sink.top_since(since, POSITIONS_LIMIT).await?;
                Ok(Response::Positions { positions })
            }
            Command::Unknown(name) => {
                warn!("Unknown command: {:?}", name);
                Ok(Response::unknown_command())
            }
        }
    }

    /// Analyses `symbol` and records the outcome before returning it.
    pub async fn analyze(&self, symbol: &str) -> Result<AnalysisOutcome, HandlerError> {
        let bars = self.store.fetch_bars(symbol, self.lookback).await?;
        let analysis = self.engine.analyze(symbol, &bars)?;

        if let Some(features) = &analysis.features {
            match self.scorer.score(features) {
                Ok(score) => debug!("Model score for {}: {:.4}", symbol, score),
                Err(e) => warn!("Scoring failed for {}: {}", symbol, e),
            }
        }

        let outcome = analysis.outcome;
        self.sink
            .record(&outcome.to_record(Utc::now().naive_utc()))
            .await?;

        info!(
            "{}: {} (confidence {:.2}, size {:.2})",
            symbol,
            outcome.action(),
            outcome.confidence(),
            outcome.suggested_position_size()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockSink, MockStore, bars_from_closes, handler_with, linear_closes};
    use common::models::{Action, InsufficientData, SignalRecord};
    use storage::SqliteStore;
    use storage::db::open_in_memory;

    #[tokio::test]
    async fn test_analyze_persists_exactly_once() {
        let mut store = MockStore::new();
        store
            .expect_fetch_bars()
            .withf(|symbol, lookback| symbol == "ETH" && *lookback == Duration::days(30))
            .times(1)
            .returning(|_, _| {
                let mut bars = bars_from_closes("ETH", &linear_closes(100.0, 1.0, 35));
                bars.reverse();
                Ok(bars)
            });

        let mut sink = MockSink::new();
        sink.expect_record()
            .withf(|r| r.symbol == "ETH" && r.action == Action::Sell)
            .times(1)
            .returning(|_| Ok(()));

        let handler = handler_with(store, sink);
        let response = handler
            .handle(Command::Analyze {
                symbol: "ETH".to_string(),
            })
            .await
            .unwrap();

        match response {
            Response::Analysis(AnalysisOutcome::Signal(s)) => {
                assert_eq!(s.action, Action::Sell);
                assert_eq!(s.reasons, vec!["RSI overbought".to_string()]);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_short_history_is_recorded_as_hold() {
        let mut store = MockStore::new();
        store
            .expect_fetch_bars()
            .returning(|symbol, _| Ok(bars_from_closes(symbol, &linear_closes(1.0, 1.0, 10))));
        let mut sink = MockSink::new();
        sink.expect_record()
            .withf(|r| {
                r.action == Action::Hold && r.confidence == 0.0 && r.suggested_position_size == 0.0
            })
            .times(1)
            .returning(|_| Ok(()));

        let handler = handler_with(store, sink);
        let outcome = handler.analyze("BNB").await.unwrap();
        assert_eq!(
            outcome,
            AnalysisOutcome::Insufficient(InsufficientData::new(
                "BNB",
                "Insufficient data for analysis",
            ))
        );
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let mut store = MockStore::new();
        store.expect_fetch_bars().times(3).returning(|symbol, _| {
            let n = if symbol == "SHORT" { 5 } else { 35 };
            Ok(bars_from_closes(symbol, &linear_closes(50.0, -0.5, n)))
        });
        let mut sink = MockSink::new();
        sink.expect_record().times(3).returning(|_| Ok(()));

        let handler = handler_with(store, sink);
        let response = handler
            .handle(Command::BatchAnalyze {
                symbols: vec!["B".to_string(), "SHORT".to_string(), "A".to_string()],
            })
            .await
            .unwrap();

        let Response::Batch { results } = response else {
            panic!("expected batch response");
        };
        let symbols: Vec<&str> = results.iter().map(|r| r.symbol()).collect();
        assert_eq!(symbols, vec!["B", "SHORT", "A"]);
        assert!(matches!(results[1], AnalysisOutcome::Insufficient(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error_not_a_panic() {
        let mut store = MockStore::new();
        store
            .expect_fetch_bars()
            .returning(|_, _| Err(storage_failure()));
        let mut sink = MockSink::new();
        sink.expect_record().never();

        let handler = handler_with(store, sink);
        let err = handler.analyze("BTC").await.unwrap_err();
        assert!(matches!(err, HandlerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_sink_failure_surfaces() {
        let mut store = MockStore::new();
        store.expect_fetch_bars().returning(|_, _| Ok(vec![]));
        let mut sink = MockSink::new();
        sink.expect_record()
            .returning(|_| Err(storage_failure()));

        let handler = handler_with(store, sink);
        assert!(handler.analyze("BTC").await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_command_response() {
        let handler = handler_with(MockStore::new(), MockSink::new());
        let response = handler.handle(Command::Unknown(Some("x".to_string()))).await.unwrap();
        assert_eq!(response, Response::unknown_command());
    }

    #[tokio::test]
    async fn test_get_positions_top_ten_of_last_hour() {
        let store = Arc::new(SqliteStore::new(open_in_memory().await.unwrap()));
        let now = Utc::now().naive_utc();

        // 10 fresh signals plus 5 more confident ones recorded two hours ago.
        for i in 0..10 {
            let record = SignalRecord {
                symbol: format!("NEW{i}"),
                action: Action::Buy,
                confidence: 0.5 + 0.04 * i as f64,
                suggested_position_size: 100.0,
                timestamp: now - Duration::minutes(5 + i as i64),
            };
            store.record(&record).await.unwrap();
        }
        for i in 0..5 {
            let record = SignalRecord {
                symbol: format!("OLD{i}"),
                action: Action::Sell,
                confidence: 0.95,
                suggested_position_size: 100.0,
                timestamp: now - Duration::hours(2) - Duration::minutes(i as i64),
            };
            store.record(&record).await.unwrap();
        }

        let handler = RequestHandler::new(
            store.clone(),
            store.clone(),
            SignalDecisionEngine::default(),
            ScoringModel::simulated(strategy::FEATURE_COUNT),
            Duration::days(30),
        );
        let response = handler.handle(Command::GetPositions).await.unwrap();
        let Response::Positions { positions } = response else {
            panic!("expected positions response");
        };

        assert_eq!(positions.len(), 10);
        assert!(positions.iter().all(|p| p.symbol.starts_with("NEW")));
        assert!(positions.windows(2).all(|w| w[0].confidence > w[1].confidence));
        assert_eq!(positions[0].symbol, "NEW9");
    }

    fn storage_failure() -> StorageError {
        StorageError::Corrupt {
            table: "market_data",
            column: "timestamp",
            value: "garbage".to_string(),
        }
    }
}

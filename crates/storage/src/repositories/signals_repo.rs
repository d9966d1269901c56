use chrono::{NaiveDateTime, Timelike};
use common::models::{Action, SignalRecord};
use sqlx::SqlitePool;

use crate::error::StorageError;

type SignalRow = (String, String, f64, f64, NaiveDateTime);

pub struct SignalsRepository;

impl SignalsRepository {
    /// Timestamps are stored to the whole second, matching the other writers
    /// of this table.
    pub async fn insert(pool: &SqlitePool, record: &SignalRecord) -> Result<(), sqlx::Error> {
        let timestamp = record.timestamp.with_nanosecond(0).unwrap_or(record.timestamp);
        sqlx::query(
            r#"
                INSERT INTO trading_signals (
                    symbol, confidence, action, suggested_position_size, timestamp
                ) VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.confidence)
        .bind(record.action.as_str())
        .bind(record.suggested_position_size)
        .bind(timestamp)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Signals recorded after `since`, most confident first.
    pub async fn fetch_recent(
        pool: &SqlitePool,
        since: NaiveDateTime,
        limit: i64,
    ) -> Result<Vec<SignalRecord>, StorageError> {
        let rows = sqlx::query_as::<_, SignalRow>(
            r#"
                SELECT symbol, action, confidence, suggested_position_size, timestamp
                FROM trading_signals
                WHERE timestamp > ?
                ORDER BY confidence DESC, id ASC
                LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|(symbol, action, confidence, suggested_position_size, timestamp)| {
                let action = action.parse::<Action>().map_err(|e| StorageError::Corrupt {
                    table: "trading_signals",
                    column: "action",
                    value: e.0,
                })?;
                Ok(SignalRecord {
                    symbol,
                    action,
                    confidence,
                    suggested_position_size,
                    timestamp,
                })
            })
            .collect()
    }
}

use chrono::NaiveDateTime;
use common::models::{OhlcvBar, OhlcvBarInsert};
use sqlx::SqlitePool;

type BarRow = (String, f64, f64, f64, f64, f64, NaiveDateTime);

pub struct MarketDataRepository;

impl MarketDataRepository {
    pub async fn insert_batch(
        pool: &SqlitePool,
        bars: &[OhlcvBarInsert],
    ) -> Result<(), sqlx::Error> {
        if bars.is_empty() {
            return Ok(());
        }

        let mut tx = pool.begin().await?;

        for bar in bars {
            sqlx::query(
                r#"
                    INSERT INTO market_data (
                        symbol, open, high, low, close, volume, timestamp
                    ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&bar.symbol)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .bind(bar.timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Bars of `symbol` within `[since, until]`, newest first.
    pub async fn fetch_range(
        pool: &SqlitePool,
        symbol: &str,
        since: NaiveDateTime,
        until: NaiveDateTime,
    ) -> Result<Vec<OhlcvBar>, sqlx::Error> {
        let rows = sqlx::query_as::<_, BarRow>(
            r#"
                SELECT symbol, open, high, low, close, volume, timestamp
                FROM market_data
                WHERE symbol = ? AND timestamp >= ? AND timestamp <= ?
                ORDER BY timestamp DESC
            "#,
        )
        .bind(symbol)
        .bind(since)
        .bind(until)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(symbol, open, high, low, close, volume, timestamp)| OhlcvBar {
                symbol,
                open,
                high,
                low,
                close,
                volume,
                timestamp,
            })
            .collect())
    }
}

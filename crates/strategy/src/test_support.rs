use chrono::{Duration, NaiveDate};
use common::models::OhlcvBar;

/// Daily bars, oldest first, flat volume, a 2-point high/low range.
pub fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<OhlcvBar> {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            symbol: symbol.to_string(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
            timestamp: start + Duration::days(i as i64),
        })
        .collect()
}

pub fn linear_closes(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

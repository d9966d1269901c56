use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("lookback of {0} reaches outside the representable time range")]
    LookbackOutOfRange(chrono::Duration),
    #[error("corrupt {column} value in {table}: {value}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        value: String,
    },
}

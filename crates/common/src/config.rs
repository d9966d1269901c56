use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = "trading_system.db";
pub const DEFAULT_PIPE_BASE: &str = "/tmp/trading_system_pipe";
pub const DEFAULT_SHM_PATH: &str = "/dev/shm/trading_shm";
pub const DEFAULT_MODEL_PATH: &str = "models/ranker.onnx";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: String,
    pub pipe_base: String,
    pub shm_path: PathBuf,
    pub model_path: String,
    pub lookback_days: i64,
    pub poll_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            pipe_base: DEFAULT_PIPE_BASE.to_string(),
            shm_path: PathBuf::from(DEFAULT_SHM_PATH),
            model_path: DEFAULT_MODEL_PATH.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let lookback_days = parse_or("LOOKBACK_DAYS", &lookup, defaults.lookback_days)?;
        if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
            return Err(ConfigError::Invalid {
                key: "LOOKBACK_DAYS",
                value: lookback_days.to_string(),
                reason: format!("must be between 1 and {}", MAX_LOOKBACK_DAYS),
            });
        }
        let poll_ms = parse_or("POLL_INTERVAL_MS", &lookup, DEFAULT_POLL_INTERVAL_MS)?;

        Ok(Self {
            db_path: lookup("DB_PATH").unwrap_or(defaults.db_path),
            pipe_base: lookup("PIPE_BASE").unwrap_or(defaults.pipe_base),
            shm_path: lookup("SHM_PATH").map(PathBuf::from).unwrap_or(defaults.shm_path),
            model_path: lookup("MODEL_PATH").unwrap_or(defaults.model_path),
            lookback_days,
            poll_interval: Duration::from_millis(poll_ms),
        })
    }

    /// FIFO this process reads requests from.
    pub fn inbound_pipe(&self) -> PathBuf {
        PathBuf::from(format!("{}_to_python", self.pipe_base))
    }

    /// FIFO this process writes responses to.
    pub fn outbound_pipe(&self) -> PathBuf {
        PathBuf::from(format!("{}_to_cpp", self.pipe_base))
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

//! Line-delimited JSON protocol spoken over the pipe pair.

use common::models::{AnalysisOutcome, SignalRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_SYMBOL: &str = "BTC";
pub const UNKNOWN_COMMAND: &str = "Unknown command";

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("{0}")]
    Malformed(serde_json::Error),
    #[error("invalid {command} request: {source}")]
    InvalidRequest {
        command: &'static str,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Analyze { symbol: String },
    BatchAnalyze { symbols: Vec<String> },
    GetPositions,
    /// Missing or unrecognized `command` field.
    Unknown(Option<String>),
}

#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default = "default_symbol")]
    symbol: String,
}

#[derive(Deserialize)]
struct BatchAnalyzeRequest {
    #[serde(default)]
    symbols: Vec<String>,
}

fn default_symbol() -> String {
    DEFAULT_SYMBOL.to_string()
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(ProtocolError::Malformed)?;
        let name = value.get("command").and_then(Value::as_str).map(str::to_owned);

        match name.as_deref() {
            Some("analyze") => {
                let req: AnalyzeRequest = from_value("analyze", value)?;
                Ok(Self::Analyze { symbol: req.symbol })
            }
            Some("batch_analyze") => {
                let req: BatchAnalyzeRequest = from_value("batch_analyze", value)?;
                Ok(Self::BatchAnalyze {
                    symbols: req.symbols,
                })
            }
            Some("get_positions") => Ok(Self::GetPositions),
            _ => Ok(Self::Unknown(name)),
        }
    }
}

fn from_value<T>(command: &'static str, value: Value) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value)
        .map_err(|source| ProtocolError::InvalidRequest { command, source })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Analysis(AnalysisOutcome),
    Batch { results: Vec<AnalysisOutcome> },
    Positions { positions: Vec<SignalRecord> },
    Error { error: String },
}

impl Response {
    pub fn error(message: impl ToString) -> Self {
        Self::Error {
            error: message.to_string(),
        }
    }

    pub fn unknown_command() -> Self {
        Self::error(UNKNOWN_COMMAND)
    }

    /// One protocol line, without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("failed to encode response: {}", e) }).to_string()
        })
    }
}

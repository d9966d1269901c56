pub mod bar;
pub mod signal;

pub use bar::{OhlcvBar, OhlcvBarInsert};
pub use signal::{
    Action, AnalysisOutcome, InsufficientData, SignalRecord, TechnicalData, TradingSignal,
};

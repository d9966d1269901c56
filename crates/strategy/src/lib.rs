pub mod decision;
pub mod features;
pub mod indicators;
pub mod inference;
pub mod stats;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use decision::{Analysis, DecisionParams, SignalDecisionEngine};
pub use features::{FEATURE_COUNT, FeatureVector, FeatureVectorBuilder};
pub use indicators::{IndicatorEngine, IndicatorError, IndicatorRow, Indicators};
pub use inference::{InferenceError, ScoringModel};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tract_onnx::prelude::*;
use tracing::{info, warn};

use crate::features::FeatureVector;

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Score returned when no model is loaded.
pub const NEUTRAL_SCORE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("expected {expected} features, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("model evaluation failed: {0}")]
    Model(String),
}

/// Ranking model over feature vectors. Loaded once before serving; its score
/// is informational and does not feed the rule cascade.
#[derive(Clone)]
pub struct ScoringModel {
    model: Option<Arc<RunnableModel>>,
    input_features: usize,
}

impl ScoringModel {
    pub fn initialize(model_path: &str, input_features: usize) -> Self {
        let path = Path::new(model_path);
        let model = if path.exists() {
            info!("Loading ONNX model from {:?}", path);
            match Self::load_model(model_path, input_features) {
                Ok(plan) => Some(Arc::new(plan)),
                Err(e) => {
                    warn!("Failed to load model: {}. Scoring disabled.", e);
                    None
                }
            }
        } else {
            warn!(
                "ONNX model not found at {:?}. Running in SIMULATION mode (neutral scores).",
                path
            );
            None
        };

        Self {
            model,
            input_features,
        }
    }

    /// A model that always returns [`NEUTRAL_SCORE`].
    pub fn simulated(input_features: usize) -> Self {
        Self {
            model: None,
            input_features,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn input_features(&self) -> usize {
        self.input_features
    }

    fn load_model(path: &str, input_features: usize) -> TractResult<RunnableModel> {
        let model = tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(0, f32::fact([1, input_features]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(model)
    }

    pub fn score(&self, features: &FeatureVector) -> Result<f32, InferenceError> {
        self.score_raw(&features.to_f32())
    }

    fn score_raw(&self, features: &[f32]) -> Result<f32, InferenceError> {
        if features.len() != self.input_features {
            return Err(InferenceError::Shape {
                expected: self.input_features,
                got: features.len(),
            });
        }

        let Some(model) = &self.model else {
            return Ok(NEUTRAL_SCORE);
        };

        // Input tensor (1, N)
        let tensor = tract_ndarray::Array::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| InferenceError::Model(e.to_string()))?
            .into_tensor();

        let result = model
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Model(e.to_string()))?;

        // Output is a single score, [1, 1] or [1].
        let output = result[0]
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Model(e.to_string()))?;
        Ok(output.iter().next().copied().unwrap_or(NEUTRAL_SCORE))
    }
}

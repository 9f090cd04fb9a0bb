//! Trained classifiers behind a common inference contract
//!
//! Two exports of the same scikit-learn model are understood:
//! - ONNX (`skl2onnx`, zipmap disabled), evaluated with tract
//! - JSON forest export with per-tree node arrays

mod forest;
mod onnx;

pub use forest::ForestClassifier;
pub use onnx::OnnxClassifier;

use crate::models::{FeatureRow, NUM_CLASSES};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

/// Output of one vectorized inference call
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    /// Predicted class per row
    pub classes: Vec<i64>,
    /// Per-row class distribution, `None` when the model has no probability output
    pub probabilities: Option<Vec<[f64; NUM_CLASSES]>>,
}

/// Model metadata reported by `/model-info`
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescription {
    pub model_type: String,
    pub params: serde_json::Value,
}

/// A loaded, immutable classifier
///
/// Implementations are shared across requests without locking, so `infer`
/// must only read.
pub trait Classifier: Send + Sync {
    /// Score all rows in a single call
    fn infer(&self, rows: &[FeatureRow]) -> Result<Inference>;

    fn describe(&self) -> ModelDescription;
}

/// Serialization format of a model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Onnx,
    JsonForest,
}

impl ModelFormat {
    /// JSON exports start with `{`; anything else is treated as ONNX protobuf
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => ModelFormat::JsonForest,
            _ => ModelFormat::Onnx,
        }
    }
}

/// Decode artifact bytes into a classifier
pub fn decode(bytes: &[u8]) -> Result<Arc<dyn Classifier>> {
    let classifier: Arc<dyn Classifier> = match ModelFormat::detect(bytes) {
        ModelFormat::JsonForest => Arc::new(ForestClassifier::from_json_slice(bytes)?),
        ModelFormat::Onnx => Arc::new(OnnxClassifier::new(bytes)?),
    };
    Ok(classifier)
}

//! Error types shared across the artifact, model and prediction layers

use thiserror::Error;

/// Network and cache both failed to supply an artifact
#[derive(Debug, Clone, Error)]
pub enum ArtifactError {
    #[error("artifact {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

impl ArtifactError {
    pub fn unavailable(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ArtifactError::Unavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to produce a classifier
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Artifact bytes were found but could not be decoded
    #[error("model artifact {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("model unavailable: {0}")]
    Unavailable(#[from] ArtifactError),
}

/// Errors surfaced by the prediction service
#[derive(Debug, Clone, Error)]
pub enum PredictionError {
    #[error("model not loaded: {0}")]
    ModelUnavailable(#[from] ModelError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl PredictionError {
    /// Stable identifier used in metrics and API responses
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::ModelUnavailable(_) => "model_unavailable",
            PredictionError::InvalidInput(_) => "invalid_input",
            PredictionError::Inference(_) => "prediction_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_error_wraps_into_model_unavailable() {
        let err: ModelError = ArtifactError::unavailable("model.onnx", "HTTP 429").into();
        assert!(matches!(err, ModelError::Unavailable(_)));
        assert!(err.to_string().contains("HTTP 429"));
    }

    #[test]
    fn test_prediction_error_kinds() {
        let corrupt = ModelError::Corrupt {
            path: "/tmp/model.onnx".to_string(),
            reason: "bad header".to_string(),
        };
        assert_eq!(
            PredictionError::from(corrupt).kind(),
            "model_unavailable"
        );
        assert_eq!(
            PredictionError::InvalidInput("empty".into()).kind(),
            "invalid_input"
        );
        assert_eq!(
            PredictionError::Inference("nan".into()).kind(),
            "prediction_failure"
        );
    }
}

//! Prediction service
//!
//! Turns feature vectors into classified results against the resolver's
//! shared classifier. Every call, single or batch, is one vectorized
//! inference so all rows are scored by the same model state.

use crate::error::PredictionError;
use crate::models::{ClassifiedResult, FeatureRow, FeatureVector, PotentialLabel, NUM_CLASSES};
use crate::observability::{ServiceMetrics, StructuredLogger};
use crate::resolver::ModelResolver;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Tolerance for probability sums reported by the model
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-3;

pub struct PredictionService {
    resolver: Arc<ModelResolver>,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl PredictionService {
    pub fn new(resolver: Arc<ModelResolver>, logger: StructuredLogger) -> Self {
        Self {
            resolver,
            metrics: ServiceMetrics::new(),
            logger,
        }
    }

    pub fn resolver(&self) -> &Arc<ModelResolver> {
        &self.resolver
    }

    /// Classify one instance
    pub async fn predict_one(
        &self,
        features: &FeatureVector,
    ) -> Result<ClassifiedResult, PredictionError> {
        let mut results = self.run(std::slice::from_ref(features)).await?;
        results
            .pop()
            .ok_or_else(|| PredictionError::Inference("model returned no result".to_string()))
    }

    /// Classify a non-empty batch; results follow input order
    pub async fn predict_batch(
        &self,
        instances: &[FeatureVector],
    ) -> Result<Vec<ClassifiedResult>, PredictionError> {
        if instances.is_empty() {
            let err = PredictionError::InvalidInput("empty batch".to_string());
            self.metrics.inc_prediction_errors(err.kind());
            return Err(err);
        }
        self.run(instances).await
    }

    async fn run(
        &self,
        instances: &[FeatureVector],
    ) -> Result<Vec<ClassifiedResult>, PredictionError> {
        let start = Instant::now();
        let result = self.infer(instances).await;

        match &result {
            Ok(results) => {
                let elapsed = start.elapsed();
                self.metrics
                    .observe_inference(elapsed.as_secs_f64(), results.len());
                self.logger
                    .log_prediction(results.len(), elapsed.as_micros() as u64);
            }
            Err(e) => {
                self.metrics.inc_prediction_errors(e.kind());
                if let PredictionError::Inference(reason) = e {
                    error!(error = %reason, instances = instances.len(), "Inference failed");
                }
            }
        }

        result
    }

    async fn infer(
        &self,
        instances: &[FeatureVector],
    ) -> Result<Vec<ClassifiedResult>, PredictionError> {
        let model = self.resolver.resolve().await?;

        let rows: Vec<FeatureRow> = instances.iter().map(FeatureVector::to_row).collect();
        let n_rows = rows.len();

        // Large batches keep a core busy; stay off the async workers
        let classifier = Arc::clone(&model.classifier);
        let inference = tokio::task::spawn_blocking(move || classifier.infer(&rows))
            .await
            .map_err(|e| PredictionError::Inference(format!("inference task failed: {}", e)))?
            .map_err(|e| PredictionError::Inference(format!("{:#}", e)))?;

        if inference.classes.len() != n_rows {
            return Err(PredictionError::Inference(format!(
                "model returned {} labels for {} instances",
                inference.classes.len(),
                n_rows
            )));
        }

        let results = match &inference.probabilities {
            Some(probabilities) => {
                if probabilities.len() != n_rows {
                    return Err(PredictionError::Inference(format!(
                        "model returned {} distributions for {} instances",
                        probabilities.len(),
                        n_rows
                    )));
                }
                inference
                    .classes
                    .iter()
                    .zip(probabilities)
                    .map(|(class, probs)| {
                        normalize(probs).map(|p| ClassifiedResult::from_distribution(*class, p))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                debug!("Classifier has no probability output, using one-hot distributions");
                inference
                    .classes
                    .iter()
                    .map(|class| ClassifiedResult::from_distribution(*class, one_hot(*class)))
                    .collect()
            }
        };

        Ok(results)
    }
}

/// Degenerate distribution at the label's position
fn one_hot(class: i64) -> [f64; NUM_CLASSES] {
    let mut probs = [0.0; NUM_CLASSES];
    probs[PotentialLabel::from_class(class).index()] = 1.0;
    probs
}

/// Rescale to sum to exactly one; float32 models drift slightly
fn normalize(probs: &[f64; NUM_CLASSES]) -> Result<[f64; NUM_CLASSES], PredictionError> {
    if probs.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(PredictionError::Inference(format!("invalid probabilities {:?}", probs)));
    }

    let sum: f64 = probs.iter().sum();
    if sum <= 0.0 {
        return Err(PredictionError::Inference("probabilities sum to zero".to_string()));
    }
    if (sum - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        debug!(sum = sum, "Renormalizing model probabilities");
    }

    Ok([probs[0] / sum, probs[1] / sum, probs[2] / sum])
}

//! ONNX inference using tract
//!
//! Evaluates `skl2onnx` classifier exports. The batch dimension stays
//! symbolic so one optimized plan scores batches of any size.

use super::{Classifier, Inference, ModelDescription};
use crate::models::{FeatureRow, NUM_CLASSES, NUM_FEATURES};
use anyhow::{bail, ensure, Context, Result};
use serde_json::json;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency before warning, per call
const MAX_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Classifier backed by an optimized tract plan
pub struct OnnxClassifier {
    model: TractModel,
    output_types: Vec<DatumType>,
}

impl OnnxClassifier {
    /// Load and optimize an ONNX model from bytes
    pub fn new(model_bytes: &[u8]) -> Result<Self> {
        let model = Self::load_model(model_bytes)?;

        let graph = model.model();
        let output_types = graph
            .output_outlets()?
            .iter()
            .map(|outlet| graph.outlet_fact(*outlet).map(|fact| fact.datum_type))
            .collect::<TractResult<Vec<_>>>()?;

        ensure!(
            output_types
                .iter()
                .any(|dt| *dt == i64::datum_type() || *dt == f32::datum_type()),
            "ONNX model has no label or probability output"
        );

        Ok(Self {
            model,
            output_types,
        })
    }

    /// The export declares its input as `[None, 15]`; tract keeps the unknown
    /// batch dimension symbolic through optimization.
    fn load_model(model_bytes: &[u8]) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .into_optimized()
            .context("Failed to optimize model")?;

        let input = model.input_fact(0).context("ONNX model has no input")?;
        ensure!(
            input.datum_type == f32::datum_type()
                && input.shape.len() == 2
                && input.shape[1] == NUM_FEATURES.to_dim(),
            "Expected f32 input of shape [N, {}], got {:?}",
            NUM_FEATURES,
            input
        );

        model
            .into_runnable()
            .context("Failed to create runnable model")
    }

    fn rows_to_tensor(rows: &[FeatureRow]) -> Result<Tensor> {
        let data: Vec<f32> = rows.iter().flatten().map(|v| *v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((rows.len(), NUM_FEATURES), data)
            .context("Failed to shape input batch")?;
        Ok(array.into())
    }

    fn has_probabilities(&self) -> bool {
        self.output_types.iter().any(|dt| *dt == f32::datum_type())
    }

    fn read_labels(output: &Tensor) -> Result<Vec<i64>> {
        Ok(output.to_array_view::<i64>()?.iter().copied().collect())
    }

    fn read_probabilities(output: &Tensor) -> Result<Vec<[f64; NUM_CLASSES]>> {
        let view = output
            .to_array_view::<f32>()?
            .into_dimensionality::<tract_ndarray::Ix2>()
            .context("Probability output must be rank 2")?;
        ensure!(
            view.ncols() == NUM_CLASSES,
            "Probability output has {} columns, expected {}",
            view.ncols(),
            NUM_CLASSES
        );

        Ok(view
            .outer_iter()
            .map(|row| [row[0] as f64, row[1] as f64, row[2] as f64])
            .collect())
    }

    /// First int64 output is the label, first rank-2 f32 output the distribution
    fn collect_outputs(outputs: &[&Tensor], n_rows: usize) -> Result<Inference> {
        let mut classes = None;
        let mut probabilities = None;
        for output in outputs {
            let dt = output.datum_type();
            if dt == i64::datum_type() && classes.is_none() {
                classes = Some(Self::read_labels(output)?);
            } else if dt == f32::datum_type() && output.rank() == 2 && probabilities.is_none() {
                probabilities = Some(Self::read_probabilities(output)?);
            }
        }

        // Probability-only exports: the label is the most likely class
        let classes = match (classes, &probabilities) {
            (Some(classes), _) => classes,
            (None, Some(probs)) => probs
                .iter()
                .map(|p| {
                    let best = (0..NUM_CLASSES)
                        .fold(0, |best, i| if p[i] > p[best] { i } else { best });
                    best as i64
                })
                .collect(),
            (None, None) => bail!("Model produced no usable output"),
        };

        ensure!(
            classes.len() == n_rows,
            "Model returned {} labels for {} rows",
            classes.len(),
            n_rows
        );
        if let Some(probs) = &probabilities {
            ensure!(
                probs.len() == n_rows,
                "Model returned {} probability rows for {} rows",
                probs.len(),
                n_rows
            );
        }

        Ok(Inference {
            classes,
            probabilities,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn infer(&self, rows: &[FeatureRow]) -> Result<Inference> {
        let start = Instant::now();

        let input = Self::rows_to_tensor(rows)?;
        let outputs = self.model.run(tvec!(input.into()))?;
        let tensors: Vec<&Tensor> = outputs.iter().map(|output| &**output).collect();
        let inference = Self::collect_outputs(&tensors, rows.len())?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                rows = rows.len(),
                "Inference exceeded {}ms target",
                MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), rows = rows.len(), "Inference completed");
        }

        Ok(inference)
    }

    fn describe(&self) -> ModelDescription {
        let outputs: Vec<String> = self
            .output_types
            .iter()
            .map(|dt| format!("{:?}", dt))
            .collect();

        ModelDescription {
            model_type: "onnx".to_string(),
            params: json!({
                "n_features": NUM_FEATURES,
                "outputs": outputs,
                "probabilities": self.has_probabilities(),
            }),
        }
    }
}

//! Random forest loaded from a JSON export of a scikit-learn model.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "model_type": "random_forest",
//!   "model_name": "growth_potential",
//!   "n_features": 15,
//!   "n_classes": 3,
//!   "classes": [0, 1, 2],
//!   "n_estimators": 100,
//!   "params": { "max_depth": 12 },
//!   "trees": [
//!     { "n_nodes": 393, "nodes": [...] },
//!     ...
//!   ]
//! }
//! ```
//!
//! Each node is `{feature, threshold, left, right, value}`; leaves have
//! `feature == -1` and carry the class distribution in `value`.

use super::{Classifier, Inference, ModelDescription};
use crate::models::{FeatureRow, NUM_CLASSES, NUM_FEATURES};
use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Clone, Deserialize)]
struct TreeNode {
    feature: i64,
    threshold: f64,
    left: i64,
    right: i64,
    value: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    #[allow(dead_code)]
    n_nodes: usize,
    nodes: Vec<TreeNode>,
}

#[derive(Debug, Deserialize)]
struct ForestJson {
    model_type: String,
    #[serde(default)]
    model_name: Option<String>,
    n_features: usize,
    n_classes: usize,
    classes: Vec<i64>,
    n_estimators: usize,
    #[serde(default)]
    params: serde_json::Value,
    trees: Vec<TreeJson>,
}

/// Flattened tree node; leaves hold a normalized distribution
#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf([f64; NUM_CLASSES]),
}

/// Random forest classifier averaging leaf distributions across trees
#[derive(Debug, Clone)]
pub struct ForestClassifier {
    name: Option<String>,
    classes: [i64; NUM_CLASSES],
    params: serde_json::Value,
    trees: Vec<Vec<Node>>,
}

impl ForestClassifier {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let model: ForestJson =
            serde_json::from_slice(bytes).context("Failed to parse forest JSON")?;

        ensure!(
            model.model_type == "random_forest",
            "Expected model_type 'random_forest', got '{}'",
            model.model_type
        );
        ensure!(
            model.n_features == NUM_FEATURES,
            "Expected {} features, got {}",
            NUM_FEATURES,
            model.n_features
        );
        ensure!(
            model.n_classes == NUM_CLASSES && model.classes.len() == NUM_CLASSES,
            "Expected {} classes, got {}",
            NUM_CLASSES,
            model.n_classes
        );
        ensure!(
            model.trees.len() == model.n_estimators,
            "n_estimators ({}) doesn't match trees count ({})",
            model.n_estimators,
            model.trees.len()
        );
        ensure!(!model.trees.is_empty(), "Random forest has no trees");

        let trees = model
            .trees
            .iter()
            .enumerate()
            .map(|(i, tree)| {
                Self::flatten(&tree.nodes).with_context(|| format!("Invalid tree {}", i))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: model.model_name,
            classes: [model.classes[0], model.classes[1], model.classes[2]],
            params: model.params,
            trees,
        })
    }

    /// Validate node links and normalize leaves.
    ///
    /// Children must come after their parent, which rules out cycles.
    fn flatten(nodes: &[TreeNode]) -> Result<Vec<Node>> {
        ensure!(!nodes.is_empty(), "tree has no nodes");

        nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                if node.feature < 0 {
                    return Self::leaf(idx, node.value.as_deref());
                }

                let feature = node.feature as usize;
                ensure!(feature < NUM_FEATURES, "node {} splits on feature {}", idx, feature);

                let child = |link: i64| -> Result<usize> {
                    match usize::try_from(link) {
                        Ok(c) if c > idx && c < nodes.len() => Ok(c),
                        _ => bail!("node {} has invalid child {}", idx, link),
                    }
                };

                Ok(Node::Split {
                    feature,
                    threshold: node.threshold,
                    left: child(node.left)?,
                    right: child(node.right)?,
                })
            })
            .collect()
    }

    fn leaf(idx: usize, value: Option<&[f64]>) -> Result<Node> {
        let value = match value {
            Some(v) if v.len() == NUM_CLASSES => v,
            _ => bail!("leaf {} must carry {} class values", idx, NUM_CLASSES),
        };

        // Older exports store sample counts rather than fractions
        let total: f64 = value.iter().sum();
        ensure!(
            total.is_finite() && total > 0.0 && value.iter().all(|v| *v >= 0.0),
            "leaf {} has an invalid distribution",
            idx
        );

        Ok(Node::Leaf([value[0] / total, value[1] / total, value[2] / total]))
    }

    fn traverse(nodes: &[Node], row: &FeatureRow) -> [f64; NUM_CLASSES] {
        let mut idx = 0usize;
        loop {
            match &nodes[idx] {
                Node::Leaf(probs) => return *probs,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // NaN goes left
                    let value = row[*feature];
                    idx = if value.is_nan() || value <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Mean of leaf distributions over all trees
    fn predict_proba(&self, row: &FeatureRow) -> [f64; NUM_CLASSES] {
        let sum = self.trees.iter().fold([0.0; NUM_CLASSES], |mut acc, tree| {
            let probs = Self::traverse(tree, row);
            for (a, p) in acc.iter_mut().zip(probs) {
                *a += p;
            }
            acc
        });

        let n = self.trees.len() as f64;
        [sum[0] / n, sum[1] / n, sum[2] / n]
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

/// Index of the largest value, first one on ties
fn argmax(values: &[f64; NUM_CLASSES]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

impl Classifier for ForestClassifier {
    fn infer(&self, rows: &[FeatureRow]) -> Result<Inference> {
        let probabilities: Vec<[f64; NUM_CLASSES]> =
            rows.iter().map(|row| self.predict_proba(row)).collect();
        let classes = probabilities
            .iter()
            .map(|p| self.classes[argmax(p)])
            .collect();

        Ok(Inference {
            classes,
            probabilities: Some(probabilities),
        })
    }

    fn describe(&self) -> ModelDescription {
        ModelDescription {
            model_type: "random_forest".to_string(),
            params: json!({
                "model_name": self.name,
                "n_estimators": self.trees.len(),
                "classes": self.classes,
                "estimator_params": self.params,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FOREST_JSON;

    fn row_with(feature: usize, value: f64) -> FeatureRow {
        let mut row = [0.0; NUM_FEATURES];
        row[feature] = value;
        row
    }

    #[test]
    fn test_load_from_json() {
        let forest = ForestClassifier::from_json_slice(FOREST_JSON.as_bytes()).unwrap();
        assert_eq!(forest.n_estimators(), 2);
        assert_eq!(forest.classes, [0, 1, 2]);
    }

    #[test]
    fn test_predict_averaging() {
        let forest = ForestClassifier::from_json_slice(FOREST_JSON.as_bytes()).unwrap();

        // marketcap = 1e9: both trees go left
        // Tree 1: [0.6, 0.3, 0.1], Tree 2: [0.8, 0.1, 0.1]
        let inference = forest.infer(&[row_with(2, 1.0e9)]).unwrap();
        let probs = inference.probabilities.unwrap()[0];
        assert!((probs[0] - 0.7).abs() < 1e-9);
        assert!((probs[1] - 0.2).abs() < 1e-9);
        assert!((probs[2] - 0.1).abs() < 1e-9);
        assert_eq!(inference.classes, vec![0]);
    }

    #[test]
    fn test_leaf_counts_are_normalized() {
        let forest = ForestClassifier::from_json_slice(FOREST_JSON.as_bytes()).unwrap();

        // marketcap = 1e12: both trees go right, tree 2 leaf holds raw counts [1, 1, 8]
        let inference = forest.infer(&[row_with(2, 1.0e12)]).unwrap();
        let probs = inference.probabilities.unwrap()[0];
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((probs[2] - 0.7).abs() < 1e-9);
        assert_eq!(inference.classes, vec![2]);
    }

    #[test]
    fn test_batch_preserves_order() {
        let forest = ForestClassifier::from_json_slice(FOREST_JSON.as_bytes()).unwrap();
        let rows = [row_with(2, 1.0e12), row_with(2, 1.0e9), row_with(2, 1.0e12)];

        let inference = forest.infer(&rows).unwrap();
        assert_eq!(inference.classes, vec![2, 0, 2]);
    }

    #[test]
    fn test_nan_goes_left() {
        let forest = ForestClassifier::from_json_slice(FOREST_JSON.as_bytes()).unwrap();
        let inference = forest.infer(&[row_with(2, f64::NAN)]).unwrap();
        assert_eq!(inference.classes, vec![0]);
    }

    #[test]
    fn test_argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), 0);
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.1, 0.2, 0.7]), 2);
    }

    #[test]
    fn test_invalid_model_type() {
        let json = FOREST_JSON.replace("\"random_forest\"", "\"decision_tree\"");
        let err = ForestClassifier::from_json_slice(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("random_forest"));
    }

    #[test]
    fn test_wrong_feature_count_is_rejected() {
        let json = FOREST_JSON.replace("\"n_features\": 15", "\"n_features\": 7");
        assert!(ForestClassifier::from_json_slice(json.as_bytes()).is_err());
    }

    #[test]
    fn test_cyclic_tree_is_rejected() {
        let json = r#"{
            "model_type": "random_forest",
            "n_features": 15, "n_classes": 3, "classes": [0, 1, 2], "n_estimators": 1,
            "trees": [{"n_nodes": 2, "nodes": [
                {"feature": 0, "threshold": 1.0, "left": 0, "right": 1, "value": null},
                {"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": [1.0, 0.0, 0.0]}
            ]}]
        }"#;
        let err = ForestClassifier::from_json_slice(json.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid child"));
    }

    #[test]
    fn test_describe_reports_params() {
        let forest = ForestClassifier::from_json_slice(FOREST_JSON.as_bytes()).unwrap();
        let description = forest.describe();
        assert_eq!(description.model_type, "random_forest");
        assert_eq!(description.params["n_estimators"], 2);
        assert_eq!(description.params["estimator_params"]["max_depth"], 1);
    }
}

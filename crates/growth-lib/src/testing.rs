//! Shared fixtures for unit tests

use crate::models::{FeatureRow, FeatureVector, NUM_FEATURES};

/// Two-stump forest splitting on `marketcap` (feature 2).
///
/// Tree 1 splits at 1e10, tree 2 at 5e10. The right leaf of tree 2 stores raw
/// sample counts to exercise normalization.
pub const FOREST_JSON: &str = r#"{
    "model_type": "random_forest",
    "model_name": "test",
    "n_features": 15,
    "n_classes": 3,
    "classes": [0, 1, 2],
    "n_estimators": 2,
    "params": {"max_depth": 1, "n_estimators": 2},
    "trees": [
        {
            "n_nodes": 3,
            "nodes": [
                {"feature": 2, "threshold": 1.0e10, "left": 1, "right": 2, "value": null},
                {"feature": -1, "threshold": 0, "left": -1, "right": -1, "value": [0.6, 0.3, 0.1]},
                {"feature": -1, "threshold": 0, "left": -1, "right": -1, "value": [0.1, 0.3, 0.6]}
            ]
        },
        {
            "n_nodes": 3,
            "nodes": [
                {"feature": 2, "threshold": 5.0e10, "left": 1, "right": 2, "value": null},
                {"feature": -1, "threshold": 0, "left": -1, "right": -1, "value": [0.8, 0.1, 0.1]},
                {"feature": -1, "threshold": 0, "left": -1, "right": -1, "value": [1.0, 1.0, 8.0]}
            ]
        }
    ]
}"#;

/// A large-cap company; `marketcap` is set per test where the class matters
pub fn sample_features() -> FeatureVector {
    FeatureVector {
        dividend_yield_ttm: 1.5,
        earnings_ttm: 2.0e9,
        marketcap: 5.0e10,
        pe_ratio_ttm: 18.0,
        revenue_ttm: 1.2e10,
        price: 120.0,
        gdp_per_capita_usd: 65000.0,
        gdp_growth_percent: 2.1,
        inflation_percent: 3.2,
        interest_rate_percent: 5.25,
        unemployment_rate_percent: 3.8,
        exchange_rate_to_usd: 1.0,
        inflation: -3.2,
        interest_rate: -5.25,
        unemployment: -3.8,
    }
}

pub fn features_with_marketcap(marketcap: f64) -> FeatureVector {
    FeatureVector {
        marketcap,
        ..sample_features()
    }
}

/// Output layout of a generated ONNX classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnnxOutputs {
    /// int64 `label` and float `probabilities`, like a zipmap-free export
    LabelAndProbabilities,
    ProbabilitiesOnly,
}

/// Columns scored by the generated model: class `c` takes its logit from
/// feature `ONNX_LOGIT_FEATURES[c]` (inflation, interest_rate, unemployment).
pub const ONNX_LOGIT_FEATURES: [usize; 3] = [12, 13, 14];

/// Serialized ONNX graph: `X[N, 15] @ W -> softmax -> probabilities` and
/// `argmax(axis = 1) -> label`, with `N` left symbolic.
pub fn onnx_model(layout: OnnxOutputs) -> Vec<u8> {
    const FLOAT: i64 = 1;
    const INT64: i64 = 7;
    const ATTR_INT: i64 = 2;

    let mut weights = vec![0f32; NUM_FEATURES * 3];
    for (class, feature) in ONNX_LOGIT_FEATURES.iter().enumerate() {
        weights[feature * 3 + class] = 1.0;
    }
    let raw: Vec<u8> = weights.iter().flat_map(|w| w.to_le_bytes()).collect();
    let initializer = Proto::default()
        .int(1, NUM_FEATURES as i64)
        .int(1, 3)
        .int(2, FLOAT)
        .string(8, "W")
        .bytes(9, &raw);

    let int_attr = |name: &str, value: i64| {
        Proto::default()
            .string(1, name)
            .int(3, value)
            .int(20, ATTR_INT)
    };
    let node = |op: &str, inputs: &[&str], outputs: &[&str], attrs: Vec<Proto>| {
        let mut node = Proto::default();
        for input in inputs {
            node = node.string(1, input);
        }
        for output in outputs {
            node = node.string(2, output);
        }
        node = node.string(3, &format!("{}_node", outputs[0])).string(4, op);
        for attr in attrs {
            node = node.message(5, attr);
        }
        node
    };
    let value_info = |name: &str, elem_type: i64, dims: Option<Proto>| {
        let mut tensor = Proto::default().int(1, elem_type);
        if let Some(shape) = dims {
            tensor = tensor.message(2, shape);
        }
        Proto::default()
            .string(1, name)
            .message(2, Proto::default().message(1, tensor))
    };

    let input_shape = Proto::default()
        .message(1, Proto::default().string(2, "N"))
        .message(1, Proto::default().int(1, NUM_FEATURES as i64));

    let mut graph = Proto::default()
        .message(1, node("MatMul", &["X", "W"], &["logits"], vec![]))
        .message(
            1,
            node("Softmax", &["logits"], &["probabilities"], vec![int_attr("axis", 1)]),
        );
    if layout == OnnxOutputs::LabelAndProbabilities {
        graph = graph.message(
            1,
            node(
                "ArgMax",
                &["logits"],
                &["label"],
                vec![int_attr("axis", 1), int_attr("keepdims", 0)],
            ),
        );
    }
    graph = graph
        .string(2, "growth_classifier")
        .message(5, initializer)
        .message(11, value_info("X", FLOAT, Some(input_shape)));
    if layout == OnnxOutputs::LabelAndProbabilities {
        graph = graph.message(12, value_info("label", INT64, None));
    }
    graph = graph.message(12, value_info("probabilities", FLOAT, None));

    Proto::default()
        .int(1, 7)
        .string(2, "growth-tests")
        .message(7, graph)
        .message(8, Proto::default().int(2, 13))
        .0
}

/// Just enough protobuf encoding to write ONNX fixtures
#[derive(Default)]
struct Proto(Vec<u8>);

impl Proto {
    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.0.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.0.push(value as u8);
    }

    fn key(&mut self, field: u32, wire_type: u8) {
        self.varint(((field as u64) << 3) | wire_type as u64);
    }

    fn int(mut self, field: u32, value: i64) -> Self {
        self.key(field, 0);
        self.varint(value as u64);
        self
    }

    fn bytes(mut self, field: u32, bytes: &[u8]) -> Self {
        self.key(field, 2);
        self.varint(bytes.len() as u64);
        self.0.extend_from_slice(bytes);
        self
    }

    fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    fn message(self, field: u32, message: Proto) -> Self {
        self.bytes(field, &message.0)
    }
}

/// Feature row whose generated-model logits are `logits`
pub fn row_with_logits(logits: [f64; 3]) -> FeatureRow {
    let mut row = [0.0; NUM_FEATURES];
    for (feature, logit) in ONNX_LOGIT_FEATURES.iter().zip(logits) {
        row[*feature] = logit;
    }
    row
}

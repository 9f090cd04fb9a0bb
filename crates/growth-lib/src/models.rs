//! Core data models for the growth potential service

use serde::{Deserialize, Serialize};

/// Number of input features expected by the classifier
pub const NUM_FEATURES: usize = 15;

/// Number of growth potential classes
pub const NUM_CLASSES: usize = 3;

/// Feature names in the order the classifier was trained on
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "dividend_yield_ttm",
    "earnings_ttm",
    "marketcap",
    "pe_ratio_ttm",
    "revenue_ttm",
    "price",
    "gdp_per_capita_usd",
    "gdp_growth_percent",
    "inflation_percent",
    "interest_rate_percent",
    "unemployment_rate_percent",
    "exchange_rate_to_usd",
    "inflation",
    "interest_rate",
    "unemployment",
];

/// One input row in training order
pub type FeatureRow = [f64; NUM_FEATURES];

/// Company and macroeconomic indicators for one prediction
///
/// Every field is required; deserialization fails when one is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Dividend yield (%)
    pub dividend_yield_ttm: f64,
    /// Earnings TTM (USD)
    pub earnings_ttm: f64,
    /// Market cap (USD)
    pub marketcap: f64,
    /// P/E ratio (TTM)
    pub pe_ratio_ttm: f64,
    /// Revenue TTM (USD)
    pub revenue_ttm: f64,
    /// Stock price (USD)
    pub price: f64,
    pub gdp_per_capita_usd: f64,
    pub gdp_growth_percent: f64,
    pub inflation_percent: f64,
    pub interest_rate_percent: f64,
    pub unemployment_rate_percent: f64,
    pub exchange_rate_to_usd: f64,
    /// Absolute inflation value (usually negative)
    pub inflation: f64,
    /// Absolute interest rate value (usually negative)
    pub interest_rate: f64,
    /// Absolute unemployment value (usually negative)
    pub unemployment: f64,
}

impl FeatureVector {
    /// Flatten into a row following `FEATURE_NAMES`
    pub fn to_row(&self) -> FeatureRow {
        [
            self.dividend_yield_ttm,
            self.earnings_ttm,
            self.marketcap,
            self.pe_ratio_ttm,
            self.revenue_ttm,
            self.price,
            self.gdp_per_capita_usd,
            self.gdp_growth_percent,
            self.inflation_percent,
            self.interest_rate_percent,
            self.unemployment_rate_percent,
            self.exchange_rate_to_usd,
            self.inflation,
            self.interest_rate,
            self.unemployment,
        ]
    }
}

/// Growth potential tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PotentialLabel {
    Low,
    Medium,
    High,
}

impl PotentialLabel {
    /// Map a class index to its label. Unknown indices map to `Low`.
    pub fn from_class(class: i64) -> Self {
        match class {
            1 => PotentialLabel::Medium,
            2 => PotentialLabel::High,
            _ => PotentialLabel::Low,
        }
    }

    /// Position of this label in a probability triple
    pub fn index(&self) -> usize {
        match self {
            PotentialLabel::Low => 0,
            PotentialLabel::Medium => 1,
            PotentialLabel::High => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PotentialLabel::Low => "Low",
            PotentialLabel::Medium => "Medium",
            PotentialLabel::High => "High",
        }
    }
}

/// Classification output for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedResult {
    pub predicted_class: i64,
    pub predicted_potential: PotentialLabel,
    pub confidence: f64,
    pub prob_low: f64,
    pub prob_medium: f64,
    pub prob_high: f64,
}

impl ClassifiedResult {
    /// Build a result from a raw class and a normalized distribution.
    ///
    /// Confidence is read at the label's position, so an out-of-range class
    /// reports the probability of `Low`.
    pub fn from_distribution(class: i64, probabilities: [f64; NUM_CLASSES]) -> Self {
        let label = PotentialLabel::from_class(class);
        Self {
            predicted_class: class,
            predicted_potential: label,
            confidence: probabilities[label.index()],
            prob_low: probabilities[0],
            prob_medium: probabilities[1],
            prob_high: probabilities[2],
        }
    }

    pub fn probabilities(&self) -> [f64; NUM_CLASSES] {
        [self.prob_low, self.prob_medium, self.prob_high]
    }
}

//! Core library for the business growth potential service
//!
//! This crate provides:
//! - Artifact acquisition with a TTL cache and stale-cache fallback
//! - Classifier decoding (ONNX and JSON forest exports)
//! - One-time model resolution and the prediction contract
//! - Health checks and observability

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod resolver;
pub mod service;

#[cfg(test)]
mod testing;

pub use error::{ArtifactError, ModelError, PredictionError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use resolver::{LoadedModel, ModelResolver, DEFAULT_RETRY_DELAY};
pub use service::PredictionService;

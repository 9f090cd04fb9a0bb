//! Growth API - business growth potential prediction service
//!
//! Resolves the trained classifier and reference dataset (pinned copy, cache
//! or network) and serves predictions over HTTP.

use anyhow::{Context, Result};
use growth_lib::{
    artifact::{ArtifactFetcher, ArtifactStore},
    dataset::ReferenceDataset,
    health::{components, HealthRegistry},
    observability::{ServiceMetrics, StructuredLogger},
    resolver::ModelResolver,
    service::PredictionService,
};
use growth_server::{api, config::ServiceConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting growth-api");

    let config = ServiceConfig::load()?;
    info!(
        service_name = %config.service_name,
        cache_dir = %config.cache_dir.display(),
        pinned_dir = %config.pinned_dir.display(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::MODEL).await;
    health_registry.register(components::DATASET).await;

    // Register metrics before the first scrape
    let _metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new(&config.service_name);

    let store = ArtifactStore::new(&config.cache_dir, config.cache_ttl());
    let fetcher = ArtifactFetcher::new(store, config.fetcher_config())?;

    let resolver = Arc::new(
        ModelResolver::new(fetcher.clone(), config.model_artifact()?, logger.clone())
            .with_retry_delay(config.model_retry_delay())
            .with_health(health_registry.clone()),
    );

    // A missing model is not fatal; prediction endpoints report 503 and
    // retry resolution once the retry delay has passed
    if let Err(e) = resolver.resolve().await {
        warn!(error = %e, "Model not loaded at startup");
    }

    let dataset = load_dataset(&fetcher, &config, &health_registry).await;

    let service = Arc::new(PredictionService::new(resolver, logger.clone()));
    let app_state = Arc::new(api::AppState::new(
        service,
        dataset,
        health_registry.clone(),
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(api::API_VERSION, config.api_port);

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await
    .context("API server failed")?;

    info!("Shutting down");
    Ok(())
}

/// Load the reference dataset; failure only degrades the service
async fn load_dataset(
    fetcher: &ArtifactFetcher,
    config: &ServiceConfig,
    health_registry: &HealthRegistry,
) -> Option<ReferenceDataset> {
    let result = match config.dataset_artifact() {
        Ok(artifact) => ReferenceDataset::load(fetcher, &artifact).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(dataset) => {
            if dataset.source.is_some_and(|s| s.is_degraded()) {
                health_registry
                    .set_degraded(components::DATASET, "serving stale cached dataset")
                    .await;
            } else if !dataset.is_complete() {
                health_registry
                    .set_degraded(
                        components::DATASET,
                        format!(
                            "dataset missing feature columns: {}",
                            dataset.missing_feature_columns().join(", ")
                        ),
                    )
                    .await;
            } else {
                health_registry.set_healthy(components::DATASET).await;
            }
            Some(dataset)
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Reference dataset unavailable");
            health_registry
                .set_degraded(components::DATASET, format!("reference dataset unavailable: {}", e))
                .await;
            None
        }
    }
}

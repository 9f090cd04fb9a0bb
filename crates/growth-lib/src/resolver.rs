//! Process-wide classifier resolution
//!
//! The resolver owns the only classifier instance. It is built on first use
//! (or eagerly at startup) from the model artifact and then shared read-only
//! by every prediction. A failed attempt leaves the slot empty; the failure is
//! remembered and returned as-is until the retry delay passes, then the next
//! caller runs the whole fetch-and-decode chain again.

use crate::artifact::{compute_checksum, ArtifactFetcher, ArtifactSource, RemoteArtifact};
use crate::classifier::{self, Classifier, ModelDescription};
use crate::error::{ArtifactError, ModelError};
use crate::health::{components, HealthRegistry};
use crate::observability::{ServiceMetrics, StructuredLogger};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Time a failed load is reused before the remote is contacted again
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// A decoded classifier and where it came from
#[derive(Clone)]
pub struct LoadedModel {
    pub classifier: Arc<dyn Classifier>,
    /// `None` for classifiers injected directly
    pub source: Option<ArtifactSource>,
    pub path: Option<PathBuf>,
    pub checksum: Option<String>,
    pub description: ModelDescription,
    pub loaded_at: i64,
}

impl LoadedModel {
    fn new(
        classifier: Arc<dyn Classifier>,
        source: Option<ArtifactSource>,
        path: Option<PathBuf>,
        checksum: Option<String>,
    ) -> Self {
        let description = classifier.describe();
        Self {
            classifier,
            source,
            path,
            checksum,
            description,
            loaded_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn source_label(&self) -> &'static str {
        self.source.map(|s| s.as_str()).unwrap_or("preloaded")
    }
}

struct RemoteModel {
    fetcher: ArtifactFetcher,
    artifact: RemoteArtifact,
}

/// Resolves the model artifact into a shared classifier exactly once
pub struct ModelResolver {
    remote: Option<RemoteModel>,
    model: OnceCell<LoadedModel>,
    last_failure: Mutex<Option<(Instant, ModelError)>>,
    retry_delay: Duration,
    health: Option<HealthRegistry>,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl ModelResolver {
    /// Resolve `artifact` through `fetcher` on first use
    pub fn new(
        fetcher: ArtifactFetcher,
        artifact: RemoteArtifact,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            remote: Some(RemoteModel { fetcher, artifact }),
            model: OnceCell::new(),
            last_failure: Mutex::new(None),
            retry_delay: DEFAULT_RETRY_DELAY,
            health: None,
            metrics: ServiceMetrics::new(),
            logger,
        }
    }

    /// Serve an already constructed classifier
    pub fn preloaded(classifier: Arc<dyn Classifier>, logger: StructuredLogger) -> Self {
        Self {
            remote: None,
            model: OnceCell::from(LoadedModel::new(classifier, None, None, None)),
            last_failure: Mutex::new(None),
            retry_delay: DEFAULT_RETRY_DELAY,
            health: None,
            metrics: ServiceMetrics::new(),
            logger,
        }
    }

    /// Report load outcomes to the `model` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// How long a failed load is reported without contacting the remote.
    /// Zero retries on every call.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// The shared classifier, loading it if this is the first successful call
    pub async fn resolve(&self) -> Result<&LoadedModel, ModelError> {
        self.model
            .get_or_try_init(|| async {
                // Also covers callers that queued behind the failed attempt
                if let Some(err) = self.recent_failure().await {
                    debug!(error = %err, "Reusing recent model load failure");
                    return Err(err);
                }
                self.load().await
            })
            .await
    }

    /// The classifier if one has already been loaded; never triggers a load
    pub fn loaded(&self) -> Option<&LoadedModel> {
        self.model.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    async fn recent_failure(&self) -> Option<ModelError> {
        let last_failure = self.last_failure.lock().await;
        last_failure
            .as_ref()
            .filter(|(failed_at, _)| failed_at.elapsed() < self.retry_delay)
            .map(|(_, err)| err.clone())
    }

    async fn load(&self) -> Result<LoadedModel, ModelError> {
        let result = self.try_load().await;

        match &result {
            Ok(model) => {
                let source = model.source_label();
                self.metrics
                    .set_model_loaded(&model.description.model_type, source);
                self.logger.log_model_loaded(
                    &model.description.model_type,
                    source,
                    model.checksum.as_deref().unwrap_or(""),
                );
                if let Some(health) = &self.health {
                    if model.source.is_some_and(|s| s.is_degraded()) {
                        health
                            .set_degraded(components::MODEL, "serving stale cached model")
                            .await;
                    } else {
                        health.set_healthy(components::MODEL).await;
                    }
                }
            }
            Err(e) => {
                *self.last_failure.lock().await = Some((Instant::now(), e.clone()));
                self.logger.log_model_unavailable(&e.to_string());
                if let Some(health) = &self.health {
                    health.set_unhealthy(components::MODEL, e.to_string()).await;
                }
            }
        }

        result
    }

    async fn try_load(&self) -> Result<LoadedModel, ModelError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| ArtifactError::unavailable("model", "no model source configured"))?;

        let resolved = remote.fetcher.fetch(&remote.artifact).await?;
        self.logger.log_artifact_resolved(
            &resolved.name,
            resolved.source.as_str(),
            &resolved.path.display().to_string(),
        );

        // Reading and decoding can take a while for large forests
        let path = resolved.path.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let checksum = compute_checksum(&bytes);
            let classifier = classifier::decode(&bytes)?;
            Ok::<_, anyhow::Error>((classifier, checksum))
        })
        .await;

        let corrupt = |reason: String| ModelError::Corrupt {
            path: resolved.path.display().to_string(),
            reason,
        };
        let (classifier, checksum) = decoded
            .map_err(|e| corrupt(e.to_string()))?
            .map_err(|e| corrupt(format!("{:#}", e)))?;

        debug!(path = %resolved.path.display(), checksum = %checksum, "Model artifact decoded");

        Ok(LoadedModel::new(
            classifier,
            Some(resolved.source),
            Some(resolved.path),
            Some(checksum),
        ))
    }
}

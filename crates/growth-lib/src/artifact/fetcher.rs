//! HTTP artifact fetcher with cache fallback
//!
//! Resolution order for an artifact:
//! 1. Pinned local copy (never expires, no network)
//! 2. Cached copy younger than the TTL
//! 3. HTTP GET, persisted to the cache on success
//! 4. Any cached copy, however old, if the download failed
//!
//! Only when all four miss is the artifact reported unavailable.

use super::{compute_checksum, ArtifactSource, ArtifactStore, RemoteArtifact, ResolvedArtifact};
use crate::error::ArtifactError;
use crate::observability::ServiceMetrics;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on a single download
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_USER_AGENT: &str = "Business-Growth-Potential-API/1.0";

const RAW_CONTENT_ACCEPT: &str = "application/vnd.github.v3.raw";

/// Configuration for artifact downloads
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Downloads larger than this are rejected
    pub max_artifact_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_artifact_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}

/// Why a download did not produce a cached artifact
#[derive(Debug)]
enum DownloadError {
    /// 403 or 429 from the remote
    RateLimited(StatusCode),
    Status(StatusCode),
    Transport(reqwest::Error),
    Rejected(String),
    Persist(String),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::RateLimited(status) => write!(f, "remote refused with HTTP {}", status),
            DownloadError::Status(status) => write!(f, "remote returned HTTP {}", status),
            DownloadError::Transport(e) if e.is_timeout() => write!(f, "request timed out: {}", e),
            DownloadError::Transport(e) => write!(f, "request failed: {}", e),
            DownloadError::Rejected(reason) => write!(f, "download rejected: {}", reason),
            DownloadError::Persist(reason) => write!(f, "failed to cache download: {}", reason),
        }
    }
}

/// Resolves artifacts to local paths
#[derive(Clone)]
pub struct ArtifactFetcher {
    client: Client,
    store: ArtifactStore,
    config: FetcherConfig,
    metrics: ServiceMetrics,
}

impl ArtifactFetcher {
    /// Create a fetcher backed by `store`
    pub fn new(store: ArtifactStore, config: FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(RAW_CONTENT_ACCEPT));

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            store,
            config,
            metrics: ServiceMetrics::new(),
        })
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Resolve `artifact` to a usable local path.
    ///
    /// Never fails while any copy of the artifact exists locally.
    pub async fn fetch(
        &self,
        artifact: &RemoteArtifact,
    ) -> Result<ResolvedArtifact, ArtifactError> {
        let result = self.resolve(artifact).await;

        let outcome = match &result {
            Ok(resolved) => resolved.source.as_str(),
            Err(_) => "unavailable",
        };
        self.metrics.inc_artifact_resolution(&artifact.name, outcome);

        result
    }

    async fn resolve(&self, artifact: &RemoteArtifact) -> Result<ResolvedArtifact, ArtifactError> {
        if let Some(pinned) = artifact.pinned_path.as_ref().filter(|p| p.is_file()) {
            debug!(name = %artifact.name, path = %pinned.display(), "Using pinned artifact");
            return Ok(self.resolved(artifact, pinned.clone(), ArtifactSource::Pinned));
        }

        let cached_path = self.store.path_for(&artifact.name);
        if self.store.is_valid(&artifact.name) {
            debug!(name = %artifact.name, path = %cached_path.display(), "Using cached artifact");
            return Ok(self.resolved(artifact, cached_path, ArtifactSource::Cache));
        }

        info!(name = %artifact.name, url = %artifact.url, "Downloading artifact");
        let error = match self.download(artifact).await {
            Ok(path) => {
                info!(name = %artifact.name, path = %path.display(), "Artifact downloaded");
                return Ok(self.resolved(artifact, path, ArtifactSource::Network));
            }
            Err(e) => e,
        };

        match &error {
            DownloadError::RateLimited(status) => warn!(
                name = %artifact.name,
                status = status.as_u16(),
                "Remote rate limited or refused artifact download"
            ),
            other => warn!(name = %artifact.name, error = %other, "Artifact download failed"),
        }

        if self.store.exists(&artifact.name) {
            warn!(
                name = %artifact.name,
                path = %cached_path.display(),
                "Falling back to stale cached artifact"
            );
            return Ok(self.resolved(artifact, cached_path, ArtifactSource::StaleCache));
        }

        Err(ArtifactError::unavailable(&artifact.name, error.to_string()))
    }

    /// GET the artifact and persist it; returns the cache path
    async fn download(&self, artifact: &RemoteArtifact) -> Result<PathBuf, DownloadError> {
        let response = self
            .client
            .get(artifact.url.clone())
            .send()
            .await
            .map_err(DownloadError::Transport)?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DownloadError::RateLimited(status));
        }
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.config.max_artifact_bytes {
                return Err(DownloadError::Rejected(format!(
                    "size {} exceeds maximum {}",
                    length, self.config.max_artifact_bytes
                )));
            }
        }

        let body = response.bytes().await.map_err(DownloadError::Transport)?;
        self.validate(artifact, &body)?;

        let store = self.store.clone();
        let name = artifact.name.clone();
        tokio::task::spawn_blocking(move || store.write(&name, &body))
            .await
            .map_err(|e| DownloadError::Persist(e.to_string()))?
            .map_err(|e| DownloadError::Persist(e.to_string()))
    }

    fn validate(&self, artifact: &RemoteArtifact, body: &[u8]) -> Result<(), DownloadError> {
        if body.len() > self.config.max_artifact_bytes {
            return Err(DownloadError::Rejected(format!(
                "size {} exceeds maximum {}",
                body.len(),
                self.config.max_artifact_bytes
            )));
        }

        let checksum = compute_checksum(body);
        if let Some(expected) = &artifact.sha256 {
            if &checksum != expected {
                return Err(DownloadError::Rejected(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, checksum
                )));
            }
        }

        debug!(
            name = %artifact.name,
            size = body.len(),
            checksum = %checksum,
            "Artifact validated"
        );
        Ok(())
    }

    fn resolved(
        &self,
        artifact: &RemoteArtifact,
        path: PathBuf,
        source: ArtifactSource,
    ) -> ResolvedArtifact {
        ResolvedArtifact {
            name: artifact.name.clone(),
            path,
            source,
        }
    }
}

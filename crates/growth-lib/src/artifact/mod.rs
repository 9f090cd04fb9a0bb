//! Remote artifact acquisition and local caching
//!
//! This module provides:
//! - A filesystem cache with age-based validity
//! - An HTTP fetcher that prefers pinned copies, then fresh cache, then the
//!   network, and finally degrades to a stale cached copy

mod fetcher;
mod store;


pub use fetcher::{ArtifactFetcher, FetcherConfig, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
pub use store::{ArtifactStore, DEFAULT_TTL};

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Description of a named artifact and where it can be found
#[derive(Debug, Clone)]
pub struct RemoteArtifact {
    /// Cache key, also the file name inside the cache directory
    pub name: String,
    pub url: Url,
    /// Locally bundled copy, used as-is when present
    pub pinned_path: Option<PathBuf>,
    /// Expected SHA256 of downloaded bytes (hex)
    pub sha256: Option<String>,
}

impl RemoteArtifact {
    /// `name` must be a plain file name
    pub fn new(name: impl Into<String>, url: Url) -> Result<Self> {
        let name = name.into();
        let is_plain = Path::new(&name)
            .file_name()
            .map(|f| f == name.as_str())
            .unwrap_or(false);
        if !is_plain {
            bail!("Artifact name {:?} must be a plain file name", name);
        }

        Ok(Self {
            name,
            url,
            pinned_path: None,
            sha256: None,
        })
    }

    pub fn with_pinned_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pinned_path = Some(path.into());
        self
    }

    pub fn with_sha256(mut self, checksum: impl Into<String>) -> Self {
        self.sha256 = Some(checksum.into().to_lowercase());
        self
    }
}

/// Where a resolved artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactSource {
    Pinned,
    /// Cached copy younger than the TTL
    Cache,
    Network,
    /// Expired cached copy served because the refresh failed
    StaleCache,
}

impl ArtifactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactSource::Pinned => "pinned",
            ArtifactSource::Cache => "cache",
            ArtifactSource::Network => "network",
            ArtifactSource::StaleCache => "stale_cache",
        }
    }

    /// True when the artifact may be older than the configured TTL
    pub fn is_degraded(&self) -> bool {
        matches!(self, ArtifactSource::StaleCache)
    }
}

impl fmt::Display for ArtifactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local path that holds a usable copy of an artifact
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub name: String,
    pub path: PathBuf,
    pub source: ArtifactSource,
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

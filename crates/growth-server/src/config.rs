//! Service configuration

use anyhow::{Context, Result};
use growth_lib::artifact::{FetcherConfig, RemoteArtifact, DEFAULT_USER_AGENT};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

const REPOSITORY_RAW_URL: &str =
    "https://raw.githubusercontent.com/sidnei-almeida/potencial_empresarial/main";

/// Service configuration
///
/// Read from an optional `growth.toml` and `GROWTH_*` environment variables,
/// the latter taking precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// HTTP port for the prediction API
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default = "default_model_url")]
    pub model_url: String,

    #[serde(default = "default_dataset_url")]
    pub dataset_url: String,

    /// Expected SHA256 of the downloaded model
    #[serde(default)]
    pub model_sha256: Option<String>,

    #[serde(default)]
    pub dataset_sha256: Option<String>,

    /// Deployment directory holding bundled `modelos/` and `dados/` copies
    #[serde(default = "default_pinned_dir")]
    pub pinned_dir: PathBuf,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Age in seconds after which a cached artifact is refreshed
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: usize,

    /// Seconds a failed model load is reported before fetching again
    #[serde(default = "default_model_retry")]
    pub model_retry_secs: u64,
}

fn default_api_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000)
}

fn default_service_name() -> String {
    "growth-api".to_string()
}

fn default_model_url() -> String {
    format!("{}/modelos/Random_Forest_model.onnx", REPOSITORY_RAW_URL)
}

fn default_dataset_url() -> String {
    format!("{}/dados/data.csv", REPOSITORY_RAW_URL)
}

fn default_pinned_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("potencial_empresarial")
}

fn default_cache_ttl() -> u64 {
    7200
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_max_artifact_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_model_retry() -> u64 {
    60
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            service_name: default_service_name(),
            model_url: default_model_url(),
            dataset_url: default_dataset_url(),
            model_sha256: None,
            dataset_sha256: None,
            pinned_dir: default_pinned_dir(),
            cache_dir: default_cache_dir(),
            cache_ttl_secs: default_cache_ttl(),
            fetch_timeout_secs: default_fetch_timeout(),
            max_artifact_bytes: default_max_artifact_bytes(),
            model_retry_secs: default_model_retry(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `growth.toml` (if present) and environment
    pub fn load() -> Result<Self> {
        Self::load_from("growth")
    }

    /// Load configuration from the given file (extension optional) and environment
    pub fn load_from(file: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("GROWTH").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn model_retry_delay(&self) -> Duration {
        Duration::from_secs(self.model_retry_secs)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_artifact_bytes: self.max_artifact_bytes,
        }
    }

    pub fn model_artifact(&self) -> Result<RemoteArtifact> {
        self.artifact(&self.model_url, "modelos", self.model_sha256.as_deref())
    }

    pub fn dataset_artifact(&self) -> Result<RemoteArtifact> {
        self.artifact(&self.dataset_url, "dados", self.dataset_sha256.as_deref())
    }

    /// The artifact is named after the last URL segment and pinned under
    /// `pinned_dir/<subdir>/<name>`
    fn artifact(&self, url: &str, subdir: &str, sha256: Option<&str>) -> Result<RemoteArtifact> {
        let url = Url::parse(url).with_context(|| format!("Invalid artifact URL {}", url))?;
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .with_context(|| format!("Artifact URL {} has no file name", url))?;

        let pinned = self.pinned_dir.join(subdir).join(&name);
        let artifact = RemoteArtifact::new(name, url)?.with_pinned_path(pinned);

        Ok(match sha256.filter(|s| !s.is_empty()) {
            Some(checksum) => artifact.with_sha256(checksum),
            None => artifact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.service_name, "growth-api");
        assert_eq!(config.cache_ttl(), Duration::from_secs(7200));
        assert_eq!(config.fetcher_config().timeout, Duration::from_secs(60));
        assert_eq!(config.max_artifact_bytes, 67_108_864);
        assert!(config.cache_dir.ends_with("potencial_empresarial"));
        assert_eq!(config.model_retry_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_model_artifact_paths() {
        let config = ServiceConfig {
            pinned_dir: PathBuf::from("/srv/app"),
            ..Default::default()
        };

        let model = config.model_artifact().unwrap();
        assert_eq!(model.name, "Random_Forest_model.onnx");
        assert_eq!(
            model.pinned_path,
            Some(PathBuf::from("/srv/app/modelos/Random_Forest_model.onnx"))
        );
        assert!(model.sha256.is_none());

        let dataset = config.dataset_artifact().unwrap();
        assert_eq!(dataset.name, "data.csv");
        assert_eq!(dataset.pinned_path, Some(PathBuf::from("/srv/app/dados/data.csv")));
    }

    #[test]
    fn test_checksum_is_attached() {
        let config = ServiceConfig {
            model_sha256: Some("ABCDEF".to_string()),
            dataset_sha256: Some(String::new()),
            ..Default::default()
        };

        assert_eq!(config.model_artifact().unwrap().sha256.as_deref(), Some("abcdef"));
        assert!(config.dataset_artifact().unwrap().sha256.is_none());
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let config = ServiceConfig {
            model_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.model_artifact().is_err());

        let config = ServiceConfig {
            model_url: "https://example.com/".to_string(),
            ..Default::default()
        };
        assert!(config.model_artifact().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("growth.toml");
        std::fs::write(
            &path,
            concat!(
                "service_name = \"growth-test\"\n",
                "cache_ttl_secs = 60\n",
                "model_retry_secs = 5\n",
                "model_url = \"http://localhost:9000/m/model.json\"\n",
            ),
        )
        .unwrap();

        let config = ServiceConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.service_name, "growth-test");
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.model_artifact().unwrap().name, "model.json");
        assert_eq!(config.fetch_timeout_secs, 60);
        assert_eq!(config.model_retry_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServiceConfig::load_from("/nonexistent/growth").unwrap();
        assert_eq!(config.cache_ttl_secs, 7200);
    }
}

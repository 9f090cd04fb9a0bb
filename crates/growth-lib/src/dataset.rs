//! Reference dataset summary
//!
//! The company dataset the classifier was trained on is published next to
//! the model. The service only needs its shape: how many example rows exist
//! and whether the feature columns line up with the model's input order.

use crate::artifact::{ArtifactFetcher, ArtifactSource, RemoteArtifact};
use crate::models::FEATURE_NAMES;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceDataset {
    pub rows: usize,
    pub columns: Vec<String>,
    /// Feature names found in the header, in model input order
    pub feature_columns_present: Vec<String>,
    #[serde(skip)]
    pub source: Option<ArtifactSource>,
}

impl ReferenceDataset {
    /// Parse CSV bytes with a header row
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(bytes);

        let columns: Vec<String> = rdr
            .headers()
            .context("Failed to read dataset header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = 0usize;
        for record in rdr.records() {
            record.with_context(|| format!("Malformed dataset row {}", rows + 1))?;
            rows += 1;
        }

        let feature_columns_present = FEATURE_NAMES
            .iter()
            .filter(|name| columns.iter().any(|c| c == *name))
            .map(|name| name.to_string())
            .collect();

        Ok(Self {
            rows,
            columns,
            feature_columns_present,
            source: None,
        })
    }

    /// Resolve the dataset artifact and summarize it
    pub async fn load(fetcher: &ArtifactFetcher, artifact: &RemoteArtifact) -> Result<Self> {
        let resolved = fetcher.fetch(artifact).await?;
        debug!(
            path = %resolved.path.display(),
            source = %resolved.source,
            "Parsing reference dataset"
        );

        let path = resolved.path.clone();
        let mut dataset = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_csv_bytes(&bytes)
        })
        .await
        .context("Dataset parse task failed")??;
        dataset.source = Some(resolved.source);

        info!(
            rows = dataset.rows,
            columns = dataset.columns.len(),
            source = %resolved.source,
            "Reference dataset loaded"
        );
        Ok(dataset)
    }

    pub fn missing_feature_columns(&self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .filter(|name| !self.feature_columns_present.iter().any(|c| c == *name))
            .copied()
            .collect()
    }

    /// True when every model feature has a column
    pub fn is_complete(&self) -> bool {
        self.feature_columns_present.len() == FEATURE_NAMES.len()
    }
}

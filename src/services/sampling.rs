//! Random sample of stored embeddings with their display columns, the input
//! of an interactive 2-D projection.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::VisualisationColumns;
use crate::repository::{EmbeddingsRepository, ScanPolicy, ScanReport};
use crate::AutoembedError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePoint {
    pub id: String,
    pub vector: Vec<f32>,
    /// Value of the color column, `None` when the embedding lacks it.
    pub label: Option<Value>,
    pub hover: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSample {
    pub points: Vec<SamplePoint>,
    pub report: ScanReport,
}

pub struct SampleEmbeddings {
    embeddings: Arc<EmbeddingsRepository>,
    policy: ScanPolicy,
}

impl SampleEmbeddings {
    pub fn new(embeddings: Arc<EmbeddingsRepository>, policy: ScanPolicy) -> Self {
        Self { embeddings, policy }
    }

    pub async fn execute(
        &self,
        n: usize,
        seed: u64,
        columns: &VisualisationColumns,
    ) -> Result<EmbeddingSample, AutoembedError> {
        let (all, report) = self.embeddings.get_all_embeddings(self.policy).await?;
        info!("Found {} embeddings, sampling {}", all.len(), n);

        let points = all
            .sample(n, seed)
            .into_iter()
            .map(|embedding| {
                let label = columns
                    .color_data_column_name
                    .as_ref()
                    .and_then(|c| embedding.metadata.get(c).cloned());
                let hover = columns
                    .hover_data_columns_name
                    .iter()
                    .filter_map(|c| embedding.metadata.get(c).map(|v| (c.clone(), v.clone())))
                    .collect();
                SamplePoint {
                    id: embedding.id,
                    vector: embedding.vector,
                    label,
                    hover,
                }
            })
            .collect();

        Ok(EmbeddingSample { points, report })
    }
}

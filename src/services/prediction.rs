//! Embed a project's prediction rows with a released model and store them.

use std::marker::PhantomData;
use std::sync::Arc;

use ndarray::Array2;
use tracing::info;

use crate::config::AutoembedConfig;
use crate::data::{DataRepository, Table};
use crate::embedding::{CandleAutoencoder, EmbeddingModel};
use crate::features::OutOfVocabulary;
use crate::models::{Embedding, EmbeddingBatch};
use crate::registry::{ModelRegistry, ModelRegistryExt, LATEST};
use crate::repository::EmbeddingsRepository;
use crate::AutoembedError;

/// Separator between the parts of a composite id.
pub const ID_SEPARATOR: &str = "-";

#[derive(Debug, Clone)]
pub struct PredictForModelReleaseCommand {
    pub project_name: String,
    /// Registry model id, or `latest`.
    pub model_version: String,
    pub prediction_data_path: String,
    pub id_columns: Vec<String>,
    pub metadata_columns: Vec<String>,
    pub out_of_vocabulary: OutOfVocabulary,
}

impl PredictForModelReleaseCommand {
    pub fn from_config(config: &AutoembedConfig, model_version: Option<&str>) -> Self {
        Self {
            project_name: config.model_name.clone(),
            model_version: model_version.unwrap_or(LATEST).to_string(),
            prediction_data_path: config.data.prediction.path.clone(),
            id_columns: config.id_column.clone(),
            metadata_columns: config.vector_store.metadata_columns.clone(),
            out_of_vocabulary: config.out_of_vocabulary,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    /// Concrete model id the embeddings were produced with.
    pub model_id: String,
    pub embedded: usize,
}

pub struct PredictForModelRelease<M = CandleAutoencoder> {
    data: Arc<dyn DataRepository>,
    registry: Arc<dyn ModelRegistry>,
    embeddings: Arc<EmbeddingsRepository>,
    _model: PhantomData<fn() -> M>,
}

impl<M: EmbeddingModel + 'static> PredictForModelRelease<M> {
    pub fn new(
        data: Arc<dyn DataRepository>,
        registry: Arc<dyn ModelRegistry>,
        embeddings: Arc<EmbeddingsRepository>,
    ) -> Self {
        Self {
            data,
            registry,
            embeddings,
            _model: PhantomData,
        }
    }

    pub async fn execute(
        &self,
        command: &PredictForModelReleaseCommand,
    ) -> Result<PredictionOutcome, AutoembedError> {
        let model_id = self
            .registry
            .resolve_model_id(&command.project_name, &command.model_version)?;
        info!(
            "Predicting with model {}/{} for {}",
            command.project_name, model_id, command.prediction_data_path
        );

        let table = self
            .data
            .get_prediction_data(&command.prediction_data_path)
            .await?;
        let mut required = command.id_columns.clone();
        required.extend(command.metadata_columns.iter().cloned());
        table.require_columns(&required)?;

        let preprocessor = self
            .registry
            .load_preprocessor(&command.project_name, &model_id)?
            .with_out_of_vocabulary(command.out_of_vocabulary);
        let model: M = self.registry.load_model(&command.project_name, &model_id)?;

        let (table, vectors) = tokio::task::spawn_blocking(move || {
            let x = preprocessor.preprocess(&table)?;
            let vectors = model.embed(&x)?;
            Ok::<_, AutoembedError>((table, vectors))
        })
        .await
        .map_err(|e| AutoembedError::Model(format!("Embedding task failed: {}", e)))??;

        let batch = build_embeddings(&table, &vectors, &command.id_columns, &command.metadata_columns)?;
        let embedded = batch.len();
        self.embeddings.update_batch(&batch).await?;
        info!("Stored {} embeddings", embedded);

        Ok(PredictionOutcome { model_id, embedded })
    }
}

/// One embedding per row.
///
/// A composite id joins its columns with [`ID_SEPARATOR`] and the parts stay
/// in the metadata; a single id column is left out of the metadata.
pub fn build_embeddings(
    table: &Table,
    vectors: &Array2<f32>,
    id_columns: &[String],
    metadata_columns: &[String],
) -> Result<EmbeddingBatch, AutoembedError> {
    if vectors.nrows() != table.len() {
        return Err(AutoembedError::ShapeMismatch {
            expected: table.len(),
            actual: vectors.nrows(),
        });
    }

    let composite = id_columns.len() > 1;
    let mut kept: Vec<String> = if composite { id_columns.to_vec() } else { Vec::new() };
    kept.extend(
        metadata_columns
            .iter()
            .filter(|c| composite || !id_columns.contains(c))
            .cloned(),
    );

    let mut batch = EmbeddingBatch::default();
    for (row, vector) in vectors.outer_iter().enumerate() {
        let id = row_id(table, row, id_columns)?;
        let metadata = table.row_json(row, &kept)?;
        batch.push(Embedding::new(id, vector.to_vec()).with_metadata(metadata));
    }
    Ok(batch)
}

fn row_id(table: &Table, row: usize, id_columns: &[String]) -> Result<String, AutoembedError> {
    let parts = id_columns
        .iter()
        .map(|column| {
            table.cell(row, column)?.to_text().ok_or_else(|| {
                AutoembedError::Validation(format!("row {} has no value for id column '{}'", row, column))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(ID_SEPARATOR))
}

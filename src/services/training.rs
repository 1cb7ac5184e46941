//! Train an embedding model on a project's training data and register it.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{AutoembedConfig, ModelingConfig};
use crate::data::{DataRepository, Table};
use crate::embedding::{CandleAutoencoder, EmbeddingModel, FitOptions, TrainingHistory};
use crate::features::{DatasetPreprocessor, OutOfVocabulary};
use crate::registry::ModelRegistry;
use crate::AutoembedError;

#[derive(Debug, Clone)]
pub struct TrainEmbeddingModelCommand {
    /// Registry name the trained model is saved under.
    pub project_name: String,
    pub training_data_path: String,
    pub modeling: ModelingConfig,
    pub out_of_vocabulary: OutOfVocabulary,
    pub seed: u64,
}

impl TrainEmbeddingModelCommand {
    pub fn from_config(config: &AutoembedConfig) -> Self {
        Self {
            project_name: config.model_name.clone(),
            training_data_path: config.data.training.path.clone(),
            modeling: config.modeling.clone(),
            out_of_vocabulary: config.out_of_vocabulary,
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model_id: String,
    pub rows: usize,
    pub history: TrainingHistory,
}

/// Fits a preprocessor and an `M` model, then saves both to the registry.
pub struct TrainEmbeddingModel<M = CandleAutoencoder> {
    data: Arc<dyn DataRepository>,
    registry: Arc<dyn ModelRegistry>,
    _model: PhantomData<fn() -> M>,
}

impl<M: EmbeddingModel + 'static> TrainEmbeddingModel<M> {
    pub fn new(data: Arc<dyn DataRepository>, registry: Arc<dyn ModelRegistry>) -> Self {
        Self {
            data,
            registry,
            _model: PhantomData,
        }
    }

    pub async fn execute(
        &self,
        command: &TrainEmbeddingModelCommand,
    ) -> Result<TrainingOutcome, AutoembedError> {
        info!(
            "Training embedding model '{}' on {}",
            command.project_name, command.training_data_path
        );
        let table = self.data.get_training_data(&command.training_data_path).await?;
        let table = light_mode_sample(table, &command.modeling, command.seed);
        let rows = table.len();

        let modeling = command.modeling.clone();
        let policy = command.out_of_vocabulary;
        let seed = command.seed;
        let (model, preprocessor, history) =
            tokio::task::spawn_blocking(move || fit_model::<M>(&table, &modeling, policy, seed))
                .await
                .map_err(|e| AutoembedError::Model(format!("Training task failed: {}", e)))??;

        let model_id = self
            .registry
            .save(&model, &preprocessor, &command.project_name)?;
        if let Some(loss) = history.final_loss() {
            info!("Model {} trained on {} rows, final loss {:.5}", model_id, rows, loss);
        }

        Ok(TrainingOutcome {
            model_id,
            rows,
            history,
        })
    }
}

/// Keep at most `light_mode_sample_size` rows when light mode is on.
fn light_mode_sample(table: Table, modeling: &ModelingConfig, seed: u64) -> Table {
    if !modeling.light_mode {
        return table;
    }
    let size = modeling.light_mode_sample_size;
    if table.len() > size {
        info!("Light mode: sampling {} of {} training rows", size, table.len());
        table.sample(size, seed)
    } else {
        warn!(
            "Training data has fewer than {} rows, using all {} rows",
            size,
            table.len()
        );
        table
    }
}

fn fit_model<M: EmbeddingModel>(
    table: &Table,
    modeling: &ModelingConfig,
    policy: OutOfVocabulary,
    seed: u64,
) -> Result<(M, DatasetPreprocessor, TrainingHistory), AutoembedError> {
    let columns = &modeling.modeling_columns;
    let mut preprocessor = DatasetPreprocessor::new(
        columns.numerical_columns.clone(),
        columns.categorical_columns.clone(),
    )
    .with_out_of_vocabulary(policy);
    preprocessor.fit(table)?;

    let x = preprocessor.preprocess(table)?;
    let y = preprocessor.preprocess_target(table)?;
    let analysis = preprocessor.get_analysis()?;
    info!(
        "Schema: {} numerical, {} categorical columns",
        analysis.numerical_columns.len(),
        analysis.categorical_columns.len()
    );

    let mut model = M::from_dataset_analysis(
        &analysis,
        modeling.bottle_neck_size,
        &modeling.hidden_layer_sizes,
    )?;
    let options = FitOptions::new(modeling.epochs, modeling.batch_size).with_seed(seed);
    let history = model.fit(&x, &y, &options)?;
    Ok((model, preprocessor, history))
}

//! Composition root: builds every collaborator from a project config.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{AutoembedConfig, DataSource, DataSourceType};
use crate::data::{CsvDataRepository, DataRepository};
use crate::db::connection::{init_db, resolve_db_config, AutoembedDb};
use crate::registry::{LocalModelRegistry, ModelRegistry};
use crate::repository::{EmbeddingsRepository, SurrealVectorStore};
use crate::services::{
    BarProgressReporter, ConsumerEmbeddingUpdater, PredictForModelRelease,
    PredictForModelReleaseCommand, RecommendationService, SampleEmbeddings, TrainEmbeddingModel,
    TrainEmbeddingModelCommand,
};

pub const DATA_PATH_ENV: &str = "AUTOEMBED_DATA_PATH";

/// Repository reading one configured data source.
pub fn data_repository(source: &DataSource) -> Arc<dyn DataRepository> {
    match source.source_type {
        DataSourceType::Csv => Arc::new(CsvDataRepository::new()),
    }
}

/// Application context holding the repositories and the registry of one project.
pub struct AppContext {
    pub config: AutoembedConfig,
    pub data_path: PathBuf,
    pub db: Arc<AutoembedDb>,
    pub training_data: Arc<dyn DataRepository>,
    pub prediction_data: Arc<dyn DataRepository>,
    pub registry: Arc<dyn ModelRegistry>,
    pub embeddings: Arc<EmbeddingsRepository>,
    pub consumer_embeddings: Arc<EmbeddingsRepository>,
}

impl AppContext {
    /// Initialize application context.
    ///
    /// Data path priority: explicit path > AUTOEMBED_DATA_PATH env > ./.autoembed
    pub async fn new(config: AutoembedConfig, explicit_path: Option<PathBuf>) -> Result<Self> {
        let data_path = explicit_path
            .or_else(|| std::env::var(DATA_PATH_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| Path::new(".autoembed").to_path_buf());
        tracing::info!("Using data path: {}", data_path.display());

        let db_config = resolve_db_config(config.database.as_ref());
        let db = Arc::new(init_db(&db_config, &data_path).await?);
        tracing::info!("Vector store connected");

        // Repositories
        let training_data = data_repository(&config.data.training);
        let prediction_data = data_repository(&config.data.prediction);
        let registry: Arc<dyn ModelRegistry> =
            Arc::new(LocalModelRegistry::new(config.registry_path.clone()));

        let items =
            SurrealVectorStore::open(db.clone(), &config.vector_store.vector_collection_name)
                .await?;
        let embeddings = Arc::new(
            EmbeddingsRepository::new(Arc::new(items))
                .with_progress(Arc::new(BarProgressReporter::new("embeddings"))),
        );
        let consumers =
            SurrealVectorStore::open(db.clone(), &config.vector_store.consumer_collection())
                .await?;
        let consumer_embeddings = Arc::new(EmbeddingsRepository::new(Arc::new(consumers)));

        Ok(Self {
            config,
            data_path,
            db,
            training_data,
            prediction_data,
            registry,
            embeddings,
            consumer_embeddings,
        })
    }

    pub fn train(&self) -> (TrainEmbeddingModel, TrainEmbeddingModelCommand) {
        (
            TrainEmbeddingModel::new(self.training_data.clone(), self.registry.clone()),
            TrainEmbeddingModelCommand::from_config(&self.config),
        )
    }

    pub fn predict(
        &self,
        model_version: Option<&str>,
    ) -> (PredictForModelRelease, PredictForModelReleaseCommand) {
        (
            PredictForModelRelease::new(
                self.prediction_data.clone(),
                self.registry.clone(),
                self.embeddings.clone(),
            ),
            PredictForModelReleaseCommand::from_config(&self.config, model_version),
        )
    }

    pub fn recommendations(&self) -> RecommendationService {
        RecommendationService::new(self.embeddings.clone())
    }

    pub fn consumer_updater(&self) -> ConsumerEmbeddingUpdater {
        ConsumerEmbeddingUpdater::new(self.consumer_embeddings.clone(), self.embeddings.clone())
    }

    pub fn sampler(&self) -> SampleEmbeddings {
        SampleEmbeddings::new(self.embeddings.clone(), self.config.scan_policy)
    }
}

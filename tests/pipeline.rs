//! End-to-end workflow: train on CSV, predict into SurrealDB, then query.

mod common;

use std::sync::Arc;

use autoembed::config::AutoembedConfig;
use autoembed::data::{CsvDataRepository, DataRepository, InMemoryDataRepository};
use autoembed::models::EventType;
use autoembed::registry::{ModelRegistry, LATEST};
use autoembed::repository::{EmbeddingsRepository, ScanPolicy};
use autoembed::services::{
    ConsumerEmbeddingUpdater, PredictForModelRelease, PredictForModelReleaseCommand,
    RecommendationService, SampleEmbeddings, TrainEmbeddingModel, TrainEmbeddingModelCommand,
};
use autoembed::AutoembedError;
use common::{listings_table, TestHarness};

fn project_yaml(light_mode: bool) -> String {
    format!(
        r#"
model_name: cars
id_column: listing_id
vector_store:
  vector_collection_name: listings
  metadata_columns: [make, energy]
data:
  training:
    type: csv
    path: train.csv
  prediction:
    type: csv
    path: predict.csv
modeling:
  light_mode: {light_mode}
  light_mode_sample_size: 30
  bottle_neck_size: 3
  epochs: 2
  batch_size: 8
  hidden_layer_sizes: [8]
  modeling_columns:
    categorical_columns: [make, energy]
    numerical_columns: [price, mileage]
visualisation:
  n_samples: 5
  visualisation_columns:
    hover_data_columns_name: [make]
    color_data_column_name: energy
"#
    )
}

fn write_csv(path: &std::path::Path, rows: usize) {
    let table = listings_table(rows);
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(table.columns()).unwrap();
    for row in 0..table.len() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|c| table.cell(row, c).unwrap().to_text().unwrap_or_default())
            .collect();
        writer.write_record(&record).unwrap();
    }
    writer.flush().unwrap();
}

#[tokio::test]
async fn test_train_predict_recommend() {
    let harness = TestHarness::new().await;
    write_csv(&harness.temp_path().join("train.csv"), 60);
    write_csv(&harness.temp_path().join("predict.csv"), 25);

    let config = AutoembedConfig::from_yaml_str(&project_yaml(true)).unwrap();
    let data: Arc<dyn DataRepository> =
        Arc::new(CsvDataRepository::new().with_base_dir(harness.temp_path()));
    let registry: Arc<dyn ModelRegistry> = Arc::new(harness.registry());
    let embeddings = Arc::new(EmbeddingsRepository::new(harness.store("listings").await));

    // train
    let train: TrainEmbeddingModel = TrainEmbeddingModel::new(data.clone(), registry.clone());
    let outcome = train
        .execute(&TrainEmbeddingModelCommand::from_config(&config))
        .await
        .unwrap();
    assert_eq!(outcome.rows, 30);
    assert_eq!(outcome.history.epochs.len(), 2);
    assert_eq!(registry.resolve_model_id("cars", LATEST).unwrap(), outcome.model_id);

    // predict
    let predict: PredictForModelRelease =
        PredictForModelRelease::new(data.clone(), registry.clone(), embeddings.clone());
    let predicted = predict
        .execute(&PredictForModelReleaseCommand::from_config(&config, None))
        .await
        .unwrap();
    assert_eq!(predicted.model_id, outcome.model_id);
    assert_eq!(predicted.embedded, 25);

    let stored = embeddings.get_embedding("L0001").await.unwrap().unwrap();
    assert_eq!(stored.dim(), 3);
    assert!(stored.vector.iter().all(|v| (-1.0..=1.0).contains(v)));
    assert_eq!(stored.metadata.get("make").unwrap(), "renault");
    assert!(!stored.metadata.contains_key("listing_id"));

    // recommend
    let recommendations = RecommendationService::new(embeddings.clone());
    let ids = recommendations.ask("L0001", 5).await.unwrap();
    assert_eq!(ids.len(), 5);
    assert!(!ids.contains(&"L0001".to_string()));

    // consumer
    let consumers = Arc::new(EmbeddingsRepository::new(harness.store("listings_consumers").await));
    let updater = ConsumerEmbeddingUpdater::new(consumers.clone(), embeddings.clone());
    let first = updater
        .update_consumer_embedding("alice", "L0001", &EventType::Detail)
        .await
        .unwrap();
    assert_eq!(first.vector, stored.vector);
    let other = embeddings.get_embedding("L0002").await.unwrap().unwrap();
    let second = updater
        .update_consumer_embedding("alice", "L0002", &EventType::Contact)
        .await
        .unwrap();
    for ((c, s), o) in second.vector.iter().zip(&stored.vector).zip(&other.vector) {
        assert!((c - (s + o * 0.6)).abs() < 1e-6);
    }

    // sample
    let sampler = SampleEmbeddings::new(embeddings.clone(), ScanPolicy::Strict);
    let sample = sampler
        .execute(5, 42, &config.visualisation.visualisation_columns)
        .await
        .unwrap();
    assert_eq!(sample.points.len(), 5);
    assert!(sample.report.is_complete());
    assert!(sample.points.iter().all(|p| p.hover.contains_key("make")));
}

#[tokio::test]
async fn test_predict_without_trained_model() {
    let harness = TestHarness::new().await;
    let config = AutoembedConfig::from_yaml_str(&project_yaml(false)).unwrap();
    let data = Arc::new(InMemoryDataRepository::new());
    data.insert("predict.csv", listings_table(5)).await;

    let predict: PredictForModelRelease = PredictForModelRelease::new(
        data,
        Arc::new(harness.registry()),
        Arc::new(EmbeddingsRepository::new(harness.store("listings").await)),
    );
    let err = predict
        .execute(&PredictForModelReleaseCommand::from_config(&config, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AutoembedError::NoTrainedModel { .. }));
}

#[tokio::test]
async fn test_training_rejects_missing_columns() {
    let harness = TestHarness::new().await;
    let config = AutoembedConfig::from_yaml_str(&project_yaml(false)).unwrap();
    let data = Arc::new(InMemoryDataRepository::new());
    let table = common::TableBuilder::new()
        .numbers("price", &[Some(1.0), Some(2.0)])
        .build();
    data.insert("train.csv", table).await;

    let train: TrainEmbeddingModel = TrainEmbeddingModel::new(data, Arc::new(harness.registry()));
    let err = train
        .execute(&TrainEmbeddingModelCommand::from_config(&config))
        .await
        .unwrap_err();
    assert!(matches!(err, AutoembedError::InvalidSchema(_)));
    assert!(harness.registry().list_models("cars").unwrap().is_empty());
}
